//! Worker lifecycle: registries, polling threads, and shutdown.

use crate::activity_worker::{ActivityTaskHandler, activity_task_loop};
use crate::decision_worker::{DecisionTaskHandler, decision_task_loop};
use crate::registry::{ActivityRegistry, WorkflowRegistrationOptions, WorkflowRegistry};
use crate::service::WorkflowService;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker already started")]
    AlreadyStarted,
    #[error("failed to spawn {loop_name} thread: {source}")]
    ThreadSpawn {
        loop_name: &'static str,
        source: std::io::Error,
    },
}

/// Per-worker configuration. One worker serves one (domain, task list)
/// pair; run several workers for several task lists.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub domain: String,
    pub task_list: String,
    /// Reported to the service on every poll and response. Defaults to
    /// `pid@host`.
    pub identity: String,
}

impl WorkerConfig {
    pub fn new(domain: impl Into<String>, task_list: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            task_list: task_list.into(),
            identity: default_identity(),
        }
    }
}

fn default_identity() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string());
    format!("{}@{}", std::process::id(), host)
}

/// Hosts the polling loops for one task list. Workflow and activity types
/// are registered up front; `start` spawns one OS thread per loop, each
/// running a current-thread async runtime (replay state is thread-local by
/// design).
pub struct Worker {
    service: Arc<dyn WorkflowService>,
    config: WorkerConfig,
    workflows: WorkflowRegistry,
    activities: ActivityRegistry,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Worker {
    pub fn new(service: Arc<dyn WorkflowService>, config: WorkerConfig) -> Self {
        Self {
            service,
            config,
            workflows: WorkflowRegistry::new(),
            activities: ActivityRegistry::new(),
            stop: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    pub fn register_workflow<F>(&mut self, options: WorkflowRegistrationOptions, factory: F)
    where
        F: Fn() -> std::rc::Rc<dyn helmsman_replay::WorkflowDefinition> + Send + Sync + 'static,
    {
        self.workflows.register(options, factory);
    }

    pub fn register_activity<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(
                crate::activity_worker::ActivityContext,
                Vec<serde_json::Value>,
            ) -> futures::future::BoxFuture<
                'static,
                Result<serde_json::Value, helmsman_types::ApplicationFailure>,
            > + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        info!(activity_type = name, "registered activity");
        self.activities.register(name, function);
    }

    /// Identifies this worker build to the service, reported with every
    /// completed decision task.
    pub fn binary_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        for name in self.workflows.type_names() {
            hasher.update(name.as_bytes());
        }
        for name in self.activities.type_names() {
            hasher.update(name.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Spawn the polling loops. A loop is only started for a side that has
    /// registrations.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if !self.threads.is_empty() {
            return Err(WorkerError::AlreadyStarted);
        }
        self.stop.store(false, Ordering::SeqCst);

        if !self.workflows.is_empty() {
            let handler = DecisionTaskHandler {
                service: Arc::clone(&self.service),
                registry: Arc::new(self.workflows.clone()),
                domain: self.config.domain.clone(),
                task_list: self.config.task_list.clone(),
                identity: self.config.identity.clone(),
                binary_checksum: self.binary_checksum(),
            };
            let stop = Arc::clone(&self.stop);
            let handle = std::thread::Builder::new()
                .name("helmsman-decision".to_string())
                .spawn(move || run_loop("decision", decision_task_loop(handler, stop)))
                .map_err(|source| WorkerError::ThreadSpawn {
                    loop_name: "decision",
                    source,
                })?;
            self.threads.push(handle);
        }

        if !self.activities.is_empty() {
            let handler = ActivityTaskHandler {
                service: Arc::clone(&self.service),
                registry: Arc::new(self.activities.clone()),
                domain: self.config.domain.clone(),
                task_list: self.config.task_list.clone(),
                identity: self.config.identity.clone(),
            };
            let stop = Arc::clone(&self.stop);
            let handle = std::thread::Builder::new()
                .name("helmsman-activity".to_string())
                .spawn(move || run_loop("activity", activity_task_loop(handler, stop)))
                .map_err(|source| WorkerError::ThreadSpawn {
                    loop_name: "activity",
                    source,
                })?;
            self.threads.push(handle);
        }

        Ok(())
    }

    /// Request shutdown and wait for the loops to finish their in-flight
    /// tasks. A thread blocked on a long poll returns once the poll does;
    /// closing the service transport is the only way to unblock it sooner.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked during shutdown");
            }
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Each polling loop runs its own single-threaded runtime: replay state
/// (Rc-based) never crosses threads.
fn run_loop(loop_name: &str, task: impl std::future::Future<Output = ()>) {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(task),
        Err(error) => error!(loop_name, %error, "failed to build polling runtime"),
    }
}

//! Workflow and activity registries.
//!
//! Both are populated before the worker starts and read-only afterwards, so
//! the polling loops share them without locking.

use crate::activity_worker::ActivityContext;
use futures::future::BoxFuture;
use helmsman_replay::WorkflowDefinition;
use helmsman_types::ApplicationFailure;
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// What to do when a new execution reuses a workflow id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkflowIdReusePolicy {
    AllowDuplicate,
    #[default]
    AllowDuplicateFailedOnly,
    RejectDuplicate,
}

/// Registration metadata for one workflow type, mirroring what a client
/// needs to start executions of it.
#[derive(Clone, Debug, Default)]
pub struct WorkflowRegistrationOptions {
    pub name: String,
    pub workflow_id: Option<String>,
    pub id_reuse_policy: WorkflowIdReusePolicy,
    pub execution_start_to_close_timeout_seconds: Option<i32>,
    pub task_start_to_close_timeout_seconds: Option<i32>,
    pub task_list: Option<String>,
    pub cron_schedule: Option<String>,
}

impl WorkflowRegistrationOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Builds a fresh workflow instance per decision task. The factory crosses
/// threads; the instances it produces never do.
pub type WorkflowFactory = Arc<dyn Fn() -> Rc<dyn WorkflowDefinition> + Send + Sync>;

#[derive(Clone)]
pub struct WorkflowRegistration {
    pub options: WorkflowRegistrationOptions,
    pub factory: WorkflowFactory,
}

#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    entries: HashMap<String, WorkflowRegistration>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow type. A later registration under the same name
    /// replaces the earlier one.
    pub fn register<F>(&mut self, options: WorkflowRegistrationOptions, factory: F)
    where
        F: Fn() -> Rc<dyn WorkflowDefinition> + Send + Sync + 'static,
    {
        let name = options.name.clone();
        self.entries.insert(
            name,
            WorkflowRegistration {
                options,
                factory: Arc::new(factory),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowRegistration> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered type names, sorted for stable output.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

/// An activity body: side-effecting async work. Failures carry the class
/// and arguments the workflow side can recover after deserialization.
pub type ActivityFunction = Arc<
    dyn Fn(ActivityContext, Vec<Value>) -> BoxFuture<'static, Result<Value, ApplicationFailure>>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct ActivityRegistry {
    entries: HashMap<String, ActivityFunction>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(ActivityContext, Vec<Value>) -> BoxFuture<'static, Result<Value, ApplicationFailure>>
            + Send
            + Sync
            + 'static,
    {
        self.entries.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&ActivityFunction> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::LocalBoxFuture;
    use helmsman_replay::WorkflowContext;
    use helmsman_types::WorkflowError;

    struct NullWorkflow;

    impl WorkflowDefinition for NullWorkflow {
        fn execute(
            self: Rc<Self>,
            _ctx: WorkflowContext,
            _input: Vec<Value>,
        ) -> LocalBoxFuture<'static, Result<Value, WorkflowError>> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    #[test]
    fn workflow_registration_is_looked_up_by_name() {
        let mut registry = WorkflowRegistry::new();
        registry.register(WorkflowRegistrationOptions::new("Greeting"), || {
            Rc::new(NullWorkflow)
        });

        assert!(registry.get("Greeting").is_some());
        assert!(registry.get("Other").is_none());
        assert_eq!(registry.type_names(), vec!["Greeting".to_string()]);

        let registration = registry.get("Greeting").unwrap();
        assert_eq!(
            registration.options.id_reuse_policy,
            WorkflowIdReusePolicy::AllowDuplicateFailedOnly
        );
        let _instance = (registration.factory)();
    }

    #[test]
    fn activity_registration_is_looked_up_by_name() {
        let mut registry = ActivityRegistry::new();
        registry.register("GreetingActivities::compose", |_ctx, args| {
            Box::pin(async move { Ok(Value::Array(args)) })
        });

        assert!(registry.get("GreetingActivities::compose").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(
            registry.type_names(),
            vec!["GreetingActivities::compose".to_string()]
        );
    }
}

//! The activity polling loop and the activity author surface.
//!
//! Thin by design: poll, decode wrapped-JSON arguments, run the registered
//! function, respond. Heartbeats and async completion go through the
//! service; the replay engine is not involved on this side.

use crate::registry::ActivityRegistry;
use crate::service::{ServiceError, WorkflowService};
use helmsman_types::{
    ApplicationFailure, PollForActivityTaskRequest, PollForActivityTaskResponse,
    RecordActivityTaskHeartbeatRequest, RecordActivityTaskHeartbeatResponse,
    RespondActivityTaskCompletedRequest,
    RespondActivityTaskFailedRequest, TaskList, WorkflowExecution, decode_args, decode_value,
    encode_value,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

/// Reason reported on every activity failure response; the serialized
/// cause travels in the details.
pub const ACTIVITY_FAILURE_REASON: &str = "ActivityFailureException";

/// Heartbeat outcome as seen by activity code.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum HeartbeatError {
    /// The service requested cancellation of this activity. The activity
    /// should stop; whatever it returns will be ignored.
    #[error("activity cancellation requested")]
    CancelRequested,
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("payload codec: {0}")]
    Payload(String),
}

/// The task an activity invocation is serving.
#[derive(Clone, Debug, Default)]
pub struct ActivityTask {
    pub task_token: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub activity_id: String,
    pub activity_type: String,
    pub attempt: Option<i32>,
    pub heartbeat_details: Option<Vec<u8>>,
}

impl ActivityTask {
    fn from_poll_response(response: &PollForActivityTaskResponse) -> Self {
        Self {
            task_token: response.task_token.clone(),
            workflow_execution: response.workflow_execution.clone(),
            activity_id: response.activity_id.clone(),
            activity_type: response.activity_type.name.clone(),
            attempt: response.attempt,
            heartbeat_details: response.heartbeat_details.clone(),
        }
    }
}

/// Handed to every activity invocation: heartbeats, prior heartbeat
/// details, and the opt-out from completing on return.
#[derive(Clone)]
pub struct ActivityContext {
    service: Arc<dyn WorkflowService>,
    task: ActivityTask,
    domain: String,
    identity: String,
    do_not_complete: Arc<AtomicBool>,
}

impl ActivityContext {
    pub(crate) fn new(
        service: Arc<dyn WorkflowService>,
        task: ActivityTask,
        domain: String,
        identity: String,
    ) -> Self {
        Self {
            service,
            task,
            domain,
            identity,
            do_not_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn task(&self) -> &ActivityTask {
        &self.task
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Record progress with the service. Surfaces a cancellation request as
    /// an error so long-running activities can stop early.
    pub async fn heartbeat<T: Serialize>(&self, details: &T) -> Result<(), HeartbeatError> {
        let request = RecordActivityTaskHeartbeatRequest {
            task_token: self.task.task_token.clone(),
            details: Some(
                encode_value(details).map_err(|error| HeartbeatError::Payload(error.to_string()))?,
            ),
            identity: self.identity.clone(),
        };
        let response = self.service.record_activity_task_heartbeat(request).await?;
        if response.cancel_requested {
            return Err(HeartbeatError::CancelRequested);
        }
        Ok(())
    }

    /// Details from the last recorded heartbeat of a previous attempt.
    pub fn heartbeat_details<T: DeserializeOwned>(&self) -> Result<Option<T>, HeartbeatError> {
        match self.task.heartbeat_details.as_deref() {
            Some(bytes) => decode_value(Some(bytes))
                .map(Some)
                .map_err(|error| HeartbeatError::Payload(error.to_string())),
            None => Ok(None),
        }
    }

    /// Opt into async completion: the worker will not respond when the
    /// function returns; completion goes through an
    /// [`ActivityCompletionClient`] holding the task token.
    pub fn do_not_complete_on_return(&self) {
        self.do_not_complete.store(true, Ordering::SeqCst);
    }

    pub fn is_do_not_complete(&self) -> bool {
        self.do_not_complete.load(Ordering::SeqCst)
    }
}

/// Completes activities that opted out of completing on return.
pub struct ActivityCompletionClient {
    service: Arc<dyn WorkflowService>,
    identity: String,
}

impl ActivityCompletionClient {
    pub fn new(service: Arc<dyn WorkflowService>, identity: impl Into<String>) -> Self {
        Self {
            service,
            identity: identity.into(),
        }
    }

    pub async fn complete<T: Serialize>(
        &self,
        task_token: Vec<u8>,
        result: &T,
    ) -> Result<(), ServiceError> {
        let request = RespondActivityTaskCompletedRequest {
            task_token,
            result: Some(
                encode_value(result)
                    .map_err(|error| ServiceError::BadRequest(error.to_string()))?,
            ),
            identity: self.identity.clone(),
        };
        self.service.respond_activity_task_completed(request).await
    }

    pub async fn complete_exceptionally(
        &self,
        task_token: Vec<u8>,
        failure: &ApplicationFailure,
    ) -> Result<(), ServiceError> {
        let request = RespondActivityTaskFailedRequest {
            task_token,
            reason: Some(ACTIVITY_FAILURE_REASON.to_string()),
            details: Some(failure.to_serialized().to_bytes()),
            identity: self.identity.clone(),
        };
        self.service.respond_activity_task_failed(request).await
    }

    pub async fn heartbeat<T: Serialize>(
        &self,
        task_token: Vec<u8>,
        details: &T,
    ) -> Result<bool, ServiceError> {
        let request = RecordActivityTaskHeartbeatRequest {
            task_token,
            details: Some(
                encode_value(details)
                    .map_err(|error| ServiceError::BadRequest(error.to_string()))?,
            ),
            identity: self.identity.clone(),
        };
        let response = self.service.record_activity_task_heartbeat(request).await?;
        Ok(response.cancel_requested)
    }
}

pub(crate) struct ActivityTaskHandler {
    pub service: Arc<dyn WorkflowService>,
    pub registry: Arc<ActivityRegistry>,
    pub domain: String,
    pub task_list: String,
    pub identity: String,
}

impl ActivityTaskHandler {
    pub async fn poll_once(&self) {
        let request = PollForActivityTaskRequest {
            domain: self.domain.clone(),
            task_list: TaskList::new(self.task_list.clone()),
            identity: self.identity.clone(),
        };
        let task = match self.service.poll_for_activity_task(request).await {
            Ok(task) => task,
            Err(error) => {
                error!(%error, "PollForActivityTask failed");
                return;
            }
        };
        if task.task_token.is_empty() {
            debug!("activity poll timed out without work");
            return;
        }
        self.process_task(task).await;
    }

    pub async fn process_task(&self, task: PollForActivityTaskResponse) {
        let activity_type = task.activity_type.name.clone();
        let Some(function) = self.registry.get(&activity_type).cloned() else {
            error!(activity_type, "activity type not registered");
            self.respond_failed(
                task.task_token.clone(),
                &ApplicationFailure::new(
                    "ActivityTypeNotFound",
                    vec![Value::String(activity_type)],
                ),
            )
            .await;
            return;
        };
        let args = match decode_args(task.input.as_deref()) {
            Ok(args) => args,
            Err(error) => {
                error!(activity_type, %error, "activity input decoding failed");
                self.respond_failed(
                    task.task_token.clone(),
                    &ApplicationFailure::new(
                        "PayloadError",
                        vec![Value::String(error.to_string())],
                    ),
                )
                .await;
                return;
            }
        };

        debug!(activity_type, ?args, "invoking activity");
        let ctx = ActivityContext::new(
            Arc::clone(&self.service),
            ActivityTask::from_poll_response(&task),
            self.domain.clone(),
            self.identity.clone(),
        );
        let outcome = function(ctx.clone(), args).await;

        if ctx.is_do_not_complete() {
            info!(activity_type, "activity deferred completion");
            return;
        }
        match outcome {
            Ok(result) => {
                let request = RespondActivityTaskCompletedRequest {
                    task_token: task.task_token,
                    result: encode_value(&result).ok(),
                    identity: self.identity.clone(),
                };
                if let Err(error) = self.service.respond_activity_task_completed(request).await {
                    error!(%error, "RespondActivityTaskCompleted failed");
                }
            }
            Err(failure) => {
                info!(activity_type, %failure, "activity failed");
                self.respond_failed(task.task_token, &failure).await;
            }
        }
    }

    async fn respond_failed(&self, task_token: Vec<u8>, failure: &ApplicationFailure) {
        let request = RespondActivityTaskFailedRequest {
            task_token,
            reason: Some(ACTIVITY_FAILURE_REASON.to_string()),
            details: Some(failure.to_serialized().to_bytes()),
            identity: self.identity.clone(),
        };
        if let Err(error) = self.service.respond_activity_task_failed(request).await {
            error!(%error, "RespondActivityTaskFailed failed");
        }
    }
}

pub(crate) async fn activity_task_loop(handler: ActivityTaskHandler, stop: Arc<AtomicBool>) {
    info!(identity = handler.identity, "activity task worker started");
    while !stop.load(Ordering::SeqCst) {
        handler.poll_once().await;
    }
    info!(identity = handler.identity, "activity task worker stopped");
}

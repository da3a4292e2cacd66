//! The orchestration service collaborator.
//!
//! The engine never talks wire protocol; it consumes and produces the
//! transfer types of `helmsman-types` through this trait. Transports
//! implement it; tests script it.

use async_trait::async_trait;
use helmsman_types::{
    PollForActivityTaskRequest, PollForActivityTaskResponse, PollForDecisionTaskRequest,
    PollForDecisionTaskResponse, RecordActivityTaskHeartbeatRequest,
    RecordActivityTaskHeartbeatResponse, RespondActivityTaskCompletedRequest,
    RespondActivityTaskFailedRequest, RespondDecisionTaskCompletedRequest,
    RespondQueryTaskCompletedRequest,
};

/// Service-side failure taxonomy, as far as the worker loops care: every
/// variant is logged and the poll retried; none of them reach the engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("entity not exists: {0}")]
    EntityNotExists(String),
    #[error("workflow execution already started: {0}")]
    ExecutionAlreadyStarted(String),
    #[error("service busy: {0}")]
    ServiceBusy(String),
    #[error("domain not active: {0}")]
    DomainNotActive(String),
    #[error("internal service error: {0}")]
    Internal(String),
    #[error("transport: {0}")]
    Transport(String),
}

/// The subset of the service API the worker loops consume.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn poll_for_decision_task(
        &self,
        request: PollForDecisionTaskRequest,
    ) -> Result<PollForDecisionTaskResponse, ServiceError>;

    async fn respond_decision_task_completed(
        &self,
        request: RespondDecisionTaskCompletedRequest,
    ) -> Result<(), ServiceError>;

    async fn respond_query_task_completed(
        &self,
        request: RespondQueryTaskCompletedRequest,
    ) -> Result<(), ServiceError>;

    async fn poll_for_activity_task(
        &self,
        request: PollForActivityTaskRequest,
    ) -> Result<PollForActivityTaskResponse, ServiceError>;

    async fn respond_activity_task_completed(
        &self,
        request: RespondActivityTaskCompletedRequest,
    ) -> Result<(), ServiceError>;

    async fn respond_activity_task_failed(
        &self,
        request: RespondActivityTaskFailedRequest,
    ) -> Result<(), ServiceError>;

    async fn record_activity_task_heartbeat(
        &self,
        request: RecordActivityTaskHeartbeatRequest,
    ) -> Result<RecordActivityTaskHeartbeatResponse, ServiceError>;
}

//! Worker runtime for the helmsman replay engine: registries for user
//! workflow and activity code, the polling loops that exchange tasks with
//! the orchestration service, and worker lifecycle management.

mod activity_worker;
mod client;
mod decision_worker;
mod registry;
mod service;
mod worker;

pub use activity_worker::{
    ACTIVITY_FAILURE_REASON, ActivityCompletionClient, ActivityContext, ActivityTask,
    HeartbeatError,
};
pub use client::{ClientError, WorkflowClient, WorkflowClientService, WorkflowStub};
pub use registry::{
    ActivityFunction, ActivityRegistry, WorkflowFactory, WorkflowIdReusePolicy,
    WorkflowRegistration, WorkflowRegistrationOptions, WorkflowRegistry,
};
pub use service::{ServiceError, WorkflowService};
pub use worker::{Worker, WorkerConfig, WorkerError};

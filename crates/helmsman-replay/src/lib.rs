//! Deterministic decision replay engine for a durable workflow
//! orchestration service.
//!
//! The service persists every workflow execution's history and delivers it
//! back with each decision task; this crate re-executes the registered
//! workflow function against that history on a single-threaded cooperative
//! scheduler, reconciles every command with the events already recorded,
//! and emits exactly the commands the workflow newly issued. Any divergence
//! between the code and the history is surfaced as a nondeterminism error
//! rather than guessed around.

mod clock;
mod context;
mod decider;
mod error;
mod futures;
mod history;
mod machines;
mod markers;
mod scheduler;

pub use context::{
    ActivityHandle, ActivityOptions, ActivityStub, TimerFuture, TimerHandle, WorkflowContext,
    WorkflowDefinition,
};
pub use decider::{ReplayDecider, WORKFLOW_FAILURE_REASON};
pub use error::{QueryError, ReplayError};
pub use history::{DecisionEvents, HistoryHelper, is_decision_event};
pub use machines::{DecisionId, DecisionState, DecisionTarget};
pub use markers::{
    DEFAULT_VERSION, LOCAL_ACTIVITY_MARKER_NAME, MUTABLE_SIDE_EFFECT_MARKER_NAME,
    SIDE_EFFECT_MARKER_NAME, VERSION_MARKER_NAME,
};

use crate::execution::{ActivityType, Header, TaskList};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Fieldless tag for the command vocabulary, mirroring [`Decision`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionType {
    ScheduleActivityTask,
    RequestCancelActivityTask,
    StartTimer,
    CancelTimer,
    RecordMarker,
    CompleteWorkflowExecution,
    FailWorkflowExecution,
    CancelWorkflowExecution,
}

/// A command from the worker to the service, produced by the replay decider
/// in emission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    ScheduleActivityTask(ScheduleActivityTaskAttributes),
    RequestCancelActivityTask(RequestCancelActivityTaskAttributes),
    StartTimer(StartTimerAttributes),
    CancelTimer(CancelTimerAttributes),
    RecordMarker(RecordMarkerAttributes),
    CompleteWorkflowExecution(CompleteWorkflowExecutionAttributes),
    FailWorkflowExecution(FailWorkflowExecutionAttributes),
    CancelWorkflowExecution(CancelWorkflowExecutionAttributes),
}

impl Decision {
    pub fn decision_type(&self) -> DecisionType {
        match self {
            Self::ScheduleActivityTask(_) => DecisionType::ScheduleActivityTask,
            Self::RequestCancelActivityTask(_) => DecisionType::RequestCancelActivityTask,
            Self::StartTimer(_) => DecisionType::StartTimer,
            Self::CancelTimer(_) => DecisionType::CancelTimer,
            Self::RecordMarker(_) => DecisionType::RecordMarker,
            Self::CompleteWorkflowExecution(_) => DecisionType::CompleteWorkflowExecution,
            Self::FailWorkflowExecution(_) => DecisionType::FailWorkflowExecution,
            Self::CancelWorkflowExecution(_) => DecisionType::CancelWorkflowExecution,
        }
    }

    /// True for the commands that close the workflow execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompleteWorkflowExecution(_)
                | Self::FailWorkflowExecution(_)
                | Self::CancelWorkflowExecution(_)
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleActivityTaskAttributes {
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub domain: Option<String>,
    pub task_list: TaskList,
    pub input: Option<Vec<u8>>,
    pub schedule_to_close_timeout_seconds: Option<i32>,
    pub schedule_to_start_timeout_seconds: Option<i32>,
    pub start_to_close_timeout_seconds: Option<i32>,
    pub heartbeat_timeout_seconds: Option<i32>,
    pub retry_policy: Option<RetryPolicy>,
    pub header: Option<Header>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestCancelActivityTaskAttributes {
    pub activity_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StartTimerAttributes {
    pub timer_id: String,
    pub start_to_fire_timeout_seconds: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelTimerAttributes {
    pub timer_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMarkerAttributes {
    pub marker_name: String,
    pub details: Option<Vec<u8>>,
    pub header: Option<Header>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteWorkflowExecutionAttributes {
    pub result: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FailWorkflowExecutionAttributes {
    pub reason: Option<String>,
    pub details: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelWorkflowExecutionAttributes {
    pub details: Option<Vec<u8>>,
}

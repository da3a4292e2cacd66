use crate::execution::{ActivityType, Header, TaskList, WorkflowExecution, WorkflowType};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which timeout fired. Carried by activity/decision timeout events and by
/// the timeout failure surfaced into workflow code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeoutType {
    StartToClose,
    ScheduleToStart,
    ScheduleToClose,
    Heartbeat,
}

impl std::fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartToClose => write!(f, "START_TO_CLOSE"),
            Self::ScheduleToStart => write!(f, "SCHEDULE_TO_START"),
            Self::ScheduleToClose => write!(f, "SCHEDULE_TO_CLOSE"),
            Self::Heartbeat => write!(f, "HEARTBEAT"),
        }
    }
}

/// The full event vocabulary of the service, as a fieldless tag.
///
/// Derived from [`EventAttributes`] via [`HistoryEvent::event_type`]; used
/// for history windowing and decision-event classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    WorkflowExecutionStarted,
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed,
    WorkflowExecutionTimedOut,
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted,
    DecisionTaskTimedOut,
    DecisionTaskFailed,
    ActivityTaskScheduled,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ActivityTaskCancelRequested,
    RequestCancelActivityTaskFailed,
    ActivityTaskCanceled,
    TimerStarted,
    TimerFired,
    CancelTimerFailed,
    TimerCanceled,
    WorkflowExecutionCancelRequested,
    WorkflowExecutionCanceled,
    RequestCancelExternalWorkflowExecutionInitiated,
    RequestCancelExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionCancelRequested,
    MarkerRecorded,
    WorkflowExecutionSignaled,
    WorkflowExecutionTerminated,
    WorkflowExecutionContinuedAsNew,
    StartChildWorkflowExecutionInitiated,
    StartChildWorkflowExecutionFailed,
    ChildWorkflowExecutionStarted,
    ChildWorkflowExecutionCompleted,
    ChildWorkflowExecutionFailed,
    ChildWorkflowExecutionCanceled,
    ChildWorkflowExecutionTimedOut,
    ChildWorkflowExecutionTerminated,
    SignalExternalWorkflowExecutionInitiated,
    SignalExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionSignaled,
    UpsertWorkflowSearchAttributes,
}

/// A single immutable record from the service's event history.
///
/// The engine never creates these; it only consumes them. `event_id` is
/// monotonically increasing within a history. `timestamp` is wall clock as
/// observed by the service and is the only source of deterministic workflow
/// time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: i64,
    pub timestamp: DateTime<Utc>,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn event_type(&self) -> EventType {
        self.attributes.event_type()
    }

    /// Event timestamp as epoch milliseconds, the unit deterministic
    /// workflow time is tracked in.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Event payloads, one variant per [`EventType`].
///
/// Events the engine consumes carry the full attribute struct. Child
/// workflow and external-workflow events carry no payload: they participate
/// in decision-event classification but scheduling them is out of scope, so
/// encountering one during dispatch is an error rather than a silent skip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventAttributes {
    // ── Workflow lifecycle ──
    WorkflowExecutionStarted(WorkflowExecutionStartedAttributes),
    WorkflowExecutionCompleted(WorkflowExecutionCompletedAttributes),
    WorkflowExecutionFailed(WorkflowExecutionFailedAttributes),
    WorkflowExecutionTimedOut(WorkflowExecutionTimedOutAttributes),
    WorkflowExecutionCancelRequested(WorkflowExecutionCancelRequestedAttributes),
    WorkflowExecutionCanceled(WorkflowExecutionCanceledAttributes),
    WorkflowExecutionSignaled(WorkflowExecutionSignaledAttributes),
    WorkflowExecutionTerminated(WorkflowExecutionTerminatedAttributes),
    WorkflowExecutionContinuedAsNew(WorkflowExecutionContinuedAsNewAttributes),

    // ── Decision task lifecycle (epoch boundaries) ──
    DecisionTaskScheduled(DecisionTaskScheduledAttributes),
    DecisionTaskStarted(DecisionTaskStartedAttributes),
    DecisionTaskCompleted(DecisionTaskCompletedAttributes),
    DecisionTaskTimedOut(DecisionTaskTimedOutAttributes),
    DecisionTaskFailed(DecisionTaskFailedAttributes),

    // ── Activity lifecycle ──
    ActivityTaskScheduled(ActivityTaskScheduledAttributes),
    ActivityTaskStarted(ActivityTaskStartedAttributes),
    ActivityTaskCompleted(ActivityTaskCompletedAttributes),
    ActivityTaskFailed(ActivityTaskFailedAttributes),
    ActivityTaskTimedOut(ActivityTaskTimedOutAttributes),
    ActivityTaskCancelRequested(ActivityTaskCancelRequestedAttributes),
    RequestCancelActivityTaskFailed(RequestCancelActivityTaskFailedAttributes),
    ActivityTaskCanceled(ActivityTaskCanceledAttributes),

    // ── Timers ──
    TimerStarted(TimerStartedAttributes),
    TimerFired(TimerFiredAttributes),
    TimerCanceled(TimerCanceledAttributes),
    CancelTimerFailed(CancelTimerFailedAttributes),

    // ── Markers ──
    MarkerRecorded(MarkerRecordedAttributes),

    // ── Child / external workflows (recognized, not supported) ──
    StartChildWorkflowExecutionInitiated(StartChildWorkflowExecutionInitiatedAttributes),
    RequestCancelExternalWorkflowExecutionInitiated(
        RequestCancelExternalWorkflowExecutionInitiatedAttributes,
    ),
    SignalExternalWorkflowExecutionInitiated(SignalExternalWorkflowExecutionInitiatedAttributes),
    StartChildWorkflowExecutionFailed,
    ChildWorkflowExecutionStarted,
    ChildWorkflowExecutionCompleted,
    ChildWorkflowExecutionFailed,
    ChildWorkflowExecutionCanceled,
    ChildWorkflowExecutionTimedOut,
    ChildWorkflowExecutionTerminated,
    RequestCancelExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionCancelRequested,
    SignalExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionSignaled,
    UpsertWorkflowSearchAttributes,
}

impl EventAttributes {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::WorkflowExecutionStarted(_) => EventType::WorkflowExecutionStarted,
            Self::WorkflowExecutionCompleted(_) => EventType::WorkflowExecutionCompleted,
            Self::WorkflowExecutionFailed(_) => EventType::WorkflowExecutionFailed,
            Self::WorkflowExecutionTimedOut(_) => EventType::WorkflowExecutionTimedOut,
            Self::WorkflowExecutionCancelRequested(_) => {
                EventType::WorkflowExecutionCancelRequested
            }
            Self::WorkflowExecutionCanceled(_) => EventType::WorkflowExecutionCanceled,
            Self::WorkflowExecutionSignaled(_) => EventType::WorkflowExecutionSignaled,
            Self::WorkflowExecutionTerminated(_) => EventType::WorkflowExecutionTerminated,
            Self::WorkflowExecutionContinuedAsNew(_) => {
                EventType::WorkflowExecutionContinuedAsNew
            }
            Self::DecisionTaskScheduled(_) => EventType::DecisionTaskScheduled,
            Self::DecisionTaskStarted(_) => EventType::DecisionTaskStarted,
            Self::DecisionTaskCompleted(_) => EventType::DecisionTaskCompleted,
            Self::DecisionTaskTimedOut(_) => EventType::DecisionTaskTimedOut,
            Self::DecisionTaskFailed(_) => EventType::DecisionTaskFailed,
            Self::ActivityTaskScheduled(_) => EventType::ActivityTaskScheduled,
            Self::ActivityTaskStarted(_) => EventType::ActivityTaskStarted,
            Self::ActivityTaskCompleted(_) => EventType::ActivityTaskCompleted,
            Self::ActivityTaskFailed(_) => EventType::ActivityTaskFailed,
            Self::ActivityTaskTimedOut(_) => EventType::ActivityTaskTimedOut,
            Self::ActivityTaskCancelRequested(_) => EventType::ActivityTaskCancelRequested,
            Self::RequestCancelActivityTaskFailed(_) => {
                EventType::RequestCancelActivityTaskFailed
            }
            Self::ActivityTaskCanceled(_) => EventType::ActivityTaskCanceled,
            Self::TimerStarted(_) => EventType::TimerStarted,
            Self::TimerFired(_) => EventType::TimerFired,
            Self::TimerCanceled(_) => EventType::TimerCanceled,
            Self::CancelTimerFailed(_) => EventType::CancelTimerFailed,
            Self::MarkerRecorded(_) => EventType::MarkerRecorded,
            Self::StartChildWorkflowExecutionInitiated(_) => {
                EventType::StartChildWorkflowExecutionInitiated
            }
            Self::RequestCancelExternalWorkflowExecutionInitiated(_) => {
                EventType::RequestCancelExternalWorkflowExecutionInitiated
            }
            Self::SignalExternalWorkflowExecutionInitiated(_) => {
                EventType::SignalExternalWorkflowExecutionInitiated
            }
            Self::StartChildWorkflowExecutionFailed => {
                EventType::StartChildWorkflowExecutionFailed
            }
            Self::ChildWorkflowExecutionStarted => EventType::ChildWorkflowExecutionStarted,
            Self::ChildWorkflowExecutionCompleted => EventType::ChildWorkflowExecutionCompleted,
            Self::ChildWorkflowExecutionFailed => EventType::ChildWorkflowExecutionFailed,
            Self::ChildWorkflowExecutionCanceled => EventType::ChildWorkflowExecutionCanceled,
            Self::ChildWorkflowExecutionTimedOut => EventType::ChildWorkflowExecutionTimedOut,
            Self::ChildWorkflowExecutionTerminated => {
                EventType::ChildWorkflowExecutionTerminated
            }
            Self::RequestCancelExternalWorkflowExecutionFailed => {
                EventType::RequestCancelExternalWorkflowExecutionFailed
            }
            Self::ExternalWorkflowExecutionCancelRequested => {
                EventType::ExternalWorkflowExecutionCancelRequested
            }
            Self::SignalExternalWorkflowExecutionFailed => {
                EventType::SignalExternalWorkflowExecutionFailed
            }
            Self::ExternalWorkflowExecutionSignaled => {
                EventType::ExternalWorkflowExecutionSignaled
            }
            Self::UpsertWorkflowSearchAttributes => EventType::UpsertWorkflowSearchAttributes,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionStartedAttributes {
    pub workflow_type: WorkflowType,
    pub task_list: TaskList,
    pub input: Option<Vec<u8>>,
    pub execution_start_to_close_timeout_seconds: Option<i32>,
    pub task_start_to_close_timeout_seconds: Option<i32>,
    pub continued_execution_run_id: Option<String>,
    pub original_execution_run_id: String,
    pub first_execution_run_id: Option<String>,
    pub identity: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub attempt: Option<i32>,
    pub cron_schedule: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionCompletedAttributes {
    pub result: Option<Vec<u8>>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionFailedAttributes {
    pub reason: Option<String>,
    pub details: Option<Vec<u8>>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionTimedOutAttributes {
    pub timeout_type: TimeoutType,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionCancelRequestedAttributes {
    pub cause: Option<String>,
    pub external_initiated_event_id: Option<i64>,
    pub external_workflow_execution: Option<WorkflowExecution>,
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionCanceledAttributes {
    pub decision_task_completed_event_id: i64,
    pub details: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionSignaledAttributes {
    pub signal_name: String,
    pub input: Option<Vec<u8>>,
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionTerminatedAttributes {
    pub reason: Option<String>,
    pub details: Option<Vec<u8>>,
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionContinuedAsNewAttributes {
    pub new_execution_run_id: String,
    pub workflow_type: WorkflowType,
    pub task_list: TaskList,
    pub input: Option<Vec<u8>>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTaskScheduledAttributes {
    pub task_list: TaskList,
    pub start_to_close_timeout_seconds: Option<i32>,
    pub attempt: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTaskStartedAttributes {
    pub scheduled_event_id: i64,
    pub identity: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTaskCompletedAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub identity: Option<String>,
    pub binary_checksum: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTaskTimedOutAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub timeout_type: Option<TimeoutType>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTaskFailedAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub reason: Option<String>,
    pub details: Option<Vec<u8>>,
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskScheduledAttributes {
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub domain: Option<String>,
    pub task_list: TaskList,
    pub input: Option<Vec<u8>>,
    pub schedule_to_close_timeout_seconds: Option<i32>,
    pub schedule_to_start_timeout_seconds: Option<i32>,
    pub start_to_close_timeout_seconds: Option<i32>,
    pub heartbeat_timeout_seconds: Option<i32>,
    pub decision_task_completed_event_id: i64,
    pub retry_policy: Option<RetryPolicy>,
    pub header: Option<Header>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskStartedAttributes {
    pub scheduled_event_id: i64,
    pub identity: Option<String>,
    pub request_id: Option<String>,
    pub attempt: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskCompletedAttributes {
    pub result: Option<Vec<u8>>,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskFailedAttributes {
    pub reason: Option<String>,
    pub details: Option<Vec<u8>>,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskTimedOutAttributes {
    pub details: Option<Vec<u8>>,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub timeout_type: Option<TimeoutType>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskCancelRequestedAttributes {
    pub activity_id: String,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestCancelActivityTaskFailedAttributes {
    pub activity_id: String,
    pub cause: Option<String>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskCanceledAttributes {
    pub details: Option<Vec<u8>>,
    pub latest_cancel_requested_event_id: Option<i64>,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerStartedAttributes {
    pub timer_id: String,
    pub start_to_fire_timeout_seconds: i64,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerFiredAttributes {
    pub timer_id: String,
    pub started_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerCanceledAttributes {
    pub timer_id: String,
    pub started_event_id: i64,
    pub decision_task_completed_event_id: i64,
    pub identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelTimerFailedAttributes {
    pub timer_id: String,
    pub cause: Option<String>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecordedAttributes {
    pub marker_name: String,
    pub details: Option<Vec<u8>>,
    pub decision_task_completed_event_id: i64,
    pub header: Option<Header>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StartChildWorkflowExecutionInitiatedAttributes {
    pub workflow_id: String,
    pub workflow_type: WorkflowType,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestCancelExternalWorkflowExecutionInitiatedAttributes {
    pub workflow_execution: WorkflowExecution,
    pub decision_task_completed_event_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalExternalWorkflowExecutionInitiatedAttributes {
    pub workflow_execution: WorkflowExecution,
    pub signal_name: String,
    pub decision_task_completed_event_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_type_matches_attribute_variant() {
        let event = HistoryEvent {
            event_id: 7,
            timestamp: Utc.timestamp_millis_opt(1_500).unwrap(),
            attributes: EventAttributes::TimerFired(TimerFiredAttributes {
                timer_id: "0".into(),
                started_event_id: 5,
            }),
        };
        assert_eq!(event.event_type(), EventType::TimerFired);
        assert_eq!(event.timestamp_millis(), 1_500);
    }

    #[test]
    fn unsupported_variants_still_carry_a_type_tag() {
        let attrs = EventAttributes::ChildWorkflowExecutionCompleted;
        assert_eq!(attrs.event_type(), EventType::ChildWorkflowExecutionCompleted);
    }
}

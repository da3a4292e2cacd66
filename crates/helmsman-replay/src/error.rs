use crate::machines::DecisionId;
use helmsman_types::EventType;

/// Fatal replay failure. Every variant means the current decision task
/// cannot be answered: the engine returns no decisions and the service will
/// redeliver the task.
///
/// Most variants are nondeterminism detections: the workflow code executed
/// by this worker diverged from the recorded history.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ReplayError {
    /// A state machine received an event its current state cannot accept.
    /// Carries the machine's full transition history for diagnostics.
    #[error("nondeterministic workflow: illegal transition for {id} (history: {history:?})")]
    IllegalMachineTransition { id: DecisionId, history: Vec<String> },

    /// A second state machine was created for an already-occupied decision
    /// id. At most one machine may exist per (target, event id).
    #[error("nondeterministic workflow: duplicate decision {id}")]
    DuplicateDecision { id: DecisionId },

    /// History referenced a command this execution never issued.
    #[error("nondeterministic workflow: no state machine for {id}")]
    UnknownMachine { id: DecisionId },

    /// An activity completion arrived but no pending result was registered
    /// under its scheduled event id; the workflow no longer schedules this
    /// activity, or scheduled it in a different order.
    #[error("nondeterministic workflow: no pending activity for scheduled event {scheduled_event_id}")]
    UnknownScheduledEvent { scheduled_event_id: i64 },

    /// Deterministic time must be monotone non-decreasing across epochs.
    #[error("workflow clock moved backwards: {current_millis} -> {observed_millis}")]
    TimeWentBackward {
        current_millis: i64,
        observed_millis: i64,
    },

    /// History windowing found an event that may not follow
    /// `DecisionTaskStarted`.
    #[error("malformed history: unexpected {event_type:?} (event {event_id}) after DecisionTaskStarted")]
    UnexpectedEventAfterDecisionTaskStarted {
        event_type: EventType,
        event_id: i64,
    },

    /// History contains an event kind this engine does not implement
    /// (child workflows, external-workflow operations).
    #[error("unsupported event {event_type:?} (event {event_id}) in history")]
    UnsupportedEvent {
        event_type: EventType,
        event_id: i64,
    },

    /// The history delivered events before the workflow execution started,
    /// or a second start.
    #[error("malformed history: {0}")]
    MalformedHistory(String),

    /// `get_version` observed a version outside the supported range.
    #[error(
        "version {version} of change id \"{change_id}\" is not supported \
         (supported: {min_supported}..={max_supported})"
    )]
    UnsupportedVersion {
        change_id: String,
        version: i32,
        min_supported: i32,
        max_supported: i32,
    },

    /// Replay required a recorded marker that history does not contain.
    #[error("nondeterministic workflow: no recorded {marker_name} marker for id \"{marker_id}\"")]
    MissingMarker {
        marker_name: String,
        marker_id: String,
    },

    /// A marker event's details could not be decoded.
    #[error("malformed {marker_name} marker at event {event_id}: {message}")]
    MalformedMarker {
        marker_name: String,
        event_id: i64,
        message: String,
    },

    /// A payload the engine itself must decode (workflow input, signal
    /// input, version data) was not valid JSON.
    #[error("payload codec: {0}")]
    Payload(String),
}

impl From<helmsman_types::PayloadError> for ReplayError {
    fn from(err: helmsman_types::PayloadError) -> Self {
        Self::Payload(err.to_string())
    }
}

/// Failure answering a query delivery.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("no query handler registered for \"{query_type}\"")]
    NotFound { query_type: String },

    /// The query coroutine suspended; queries must complete within one
    /// scheduler pass.
    #[error("query \"{query_type}\" did not complete in one scheduler pass")]
    DidNotComplete { query_type: String },

    #[error("query \"{query_type}\" failed: {message}")]
    Failed { query_type: String, message: String },

    #[error("query delivered before the workflow execution started")]
    WorkflowNotStarted,
}

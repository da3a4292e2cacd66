//! Failure serialization across the service boundary.
//!
//! Failures travel as a JSON blob `{class, args, traceback, source}`. When a
//! payload's `source` tag matches this library, deserialization reconstructs
//! a typed application failure carrying the original class name, arguments,
//! and traceback text; any other source is preserved verbatim as an external
//! failure.

use crate::event::TimeoutType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::backtrace::Backtrace;
use std::fmt;

/// Source tag stamped into every failure this library serializes.
pub const FAILURE_SOURCE: &str = "helmsman-rust";

/// The wire form of a failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedFailure {
    pub class: String,
    pub args: Vec<Value>,
    pub traceback: String,
    pub source: String,
}

impl SerializedFailure {
    /// Build a failure blob for this library, capturing the current
    /// backtrace as the traceback text.
    pub fn capture(class: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            class: class.into(),
            args,
            traceback: Backtrace::force_capture().to_string(),
            source: FAILURE_SOURCE.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // The struct contains only JSON-representable fields.
        serde_json::to_vec(self).expect("failure blob is always serializable")
    }
}

/// A failure whose origin was this library on the other side of the wire.
///
/// Rust cannot rehydrate arbitrary error types by name, so the class is
/// carried as data; callers match on `class` to recognize their own errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicationFailure {
    pub class: String,
    pub args: Vec<Value>,
    pub traceback: String,
}

impl ApplicationFailure {
    pub fn new(class: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            class: class.into(),
            args,
            traceback: Backtrace::force_capture().to_string(),
        }
    }

    /// Wire form, stamped with this library's source tag.
    pub fn to_serialized(&self) -> SerializedFailure {
        SerializedFailure {
            class: self.class.clone(),
            args: self.args.clone(),
            traceback: self.traceback.clone(),
            source: FAILURE_SOURCE.to_string(),
        }
    }
}

impl fmt::Display for ApplicationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class)?;
        if !self.args.is_empty() {
            let rendered: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, "({})", rendered.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ApplicationFailure {}

/// A failure decoded from the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteFailure {
    /// Serialized by this library; class, args and traceback survive.
    Application(ApplicationFailure),
    /// Foreign source, or a payload we could not parse. Details verbatim.
    External { details: Value },
}

/// Decode a failure blob. Never fails: unparseable payloads become external
/// failures carrying the raw text.
pub fn deserialize_failure(details: &[u8]) -> RemoteFailure {
    let parsed: Result<SerializedFailure, _> = serde_json::from_slice(details);
    match parsed {
        Ok(blob) if blob.source == FAILURE_SOURCE => RemoteFailure::Application(
            ApplicationFailure {
                class: blob.class,
                args: blob.args,
                traceback: blob.traceback,
            },
        ),
        Ok(blob) => RemoteFailure::External {
            details: serde_json::to_value(&blob).unwrap_or(Value::Null),
        },
        Err(_) => RemoteFailure::External {
            details: Value::String(String::from_utf8_lossy(details).into_owned()),
        },
    }
}

/// Activity failure surfaced into the awaiting workflow.
///
/// `details` is the serialized cause; it is deserialized lazily via
/// [`ActivityFailure::cause`] so the original class is recoverable when this
/// library produced both sides.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("activity {activity_type} (id {activity_id}, scheduled event {scheduled_event_id}) failed")]
pub struct ActivityFailure {
    pub scheduled_event_id: i64,
    pub activity_type: String,
    pub activity_id: String,
    pub reason: Option<String>,
    pub details: Option<Vec<u8>>,
}

impl ActivityFailure {
    pub fn cause(&self) -> Option<RemoteFailure> {
        self.details.as_deref().map(deserialize_failure)
    }
}

/// Activity timeout surfaced into the awaiting workflow. `details` carries
/// the last recorded heartbeat payload, when there was one.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("activity scheduled at event {scheduled_event_id} timed out: {timeout_type}")]
pub struct ActivityTimeout {
    pub scheduled_event_id: i64,
    pub timeout_type: TimeoutType,
    pub details: Option<Vec<u8>>,
}

/// Cancellation delivered into an awaiting coroutine: timer cancelled,
/// activity cancelled, or the whole execution cancelled.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CancelledError {
    pub reason: Option<String>,
}

impl CancelledError {
    pub fn new() -> Self {
        Self { reason: None }
    }

    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cancelled by request")?;
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for CancelledError {}

/// Everything a workflow body can fail with.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Activity(#[from] ActivityFailure),
    #[error(transparent)]
    Timeout(#[from] ActivityTimeout),
    #[error(transparent)]
    Cancelled(#[from] CancelledError),
    #[error(transparent)]
    Application(#[from] ApplicationFailure),
    #[error("payload codec: {0}")]
    Payload(String),
}

impl WorkflowError {
    pub fn application(class: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Application(ApplicationFailure::new(class, args))
    }

    /// Serialize for `FailWorkflowExecution` details.
    ///
    /// An activity failure already carries its cause as a failure blob, so
    /// those bytes are passed through unchanged and decode back to the
    /// original activity error. Everything else serializes freshly.
    pub fn serialize_details(&self) -> Vec<u8> {
        match self {
            Self::Activity(failure) => match &failure.details {
                Some(details) => details.clone(),
                None => SerializedFailure::capture(
                    "ActivityFailure",
                    vec![Value::String(failure.to_string())],
                )
                .to_bytes(),
            },
            Self::Timeout(timeout) => SerializedFailure::capture(
                "ActivityTimeout",
                vec![Value::String(timeout.timeout_type.to_string())],
            )
            .to_bytes(),
            Self::Cancelled(cancelled) => SerializedFailure::capture(
                "CancelledError",
                cancelled
                    .reason
                    .iter()
                    .map(|r| Value::String(r.clone()))
                    .collect(),
            )
            .to_bytes(),
            Self::Application(app) => SerializedFailure {
                class: app.class.clone(),
                args: app.args.clone(),
                traceback: app.traceback.clone(),
                source: FAILURE_SOURCE.to_string(),
            }
            .to_bytes(),
            Self::Payload(message) => SerializedFailure::capture(
                "PayloadError",
                vec![Value::String(message.clone())],
            )
            .to_bytes(),
        }
    }
}

impl From<crate::payload::PayloadError> for WorkflowError {
    fn from(err: crate::payload::PayloadError) -> Self {
        Self::Payload(err.to_string())
    }
}

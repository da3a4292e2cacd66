use serde::{Deserialize, Serialize};

/// Service-side retry policy attached to activity schedules and workflow
/// starts. The service is authoritative for retry execution; the worker only
/// carries the policy across the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval_seconds: Option<i32>,
    pub backoff_coefficient: Option<f64>,
    pub maximum_interval_seconds: Option<i32>,
    pub maximum_attempts: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_retriable_error_reasons: Vec<String>,
    pub expiration_interval_seconds: Option<i32>,
}

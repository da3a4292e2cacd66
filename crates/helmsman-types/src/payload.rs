//! The opaque-payload codec for arguments and results crossing the service
//! boundary.
//!
//! Arguments are wrapped by arity: zero arguments encode as JSON `null`, a
//! single argument encodes as that argument's JSON, and two or more encode
//! as a JSON array. Decoding is symmetric, so a recorded payload always
//! decodes to the argument list that produced it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Codec failure, surfaced to callers as a payload error on whatever
/// operation attempted the conversion.
#[derive(Debug, thiserror::Error)]
#[error("payload codec: {0}")]
pub struct PayloadError(#[from] serde_json::Error);

/// Encode an argument list using the arity-wrapping rule.
pub fn encode_args(args: &[Value]) -> Result<Vec<u8>, PayloadError> {
    let value = match args {
        [] => Value::Null,
        [single] => single.clone(),
        many => Value::Array(many.to_vec()),
    };
    Ok(serde_json::to_vec(&value)?)
}

/// Decode a payload back into an argument list.
///
/// A missing or `null` payload is an empty argument list; an array is a
/// multi-argument list; any other JSON value is a single argument.
pub fn decode_args(payload: Option<&[u8]>) -> Result<Vec<Value>, PayloadError> {
    let Some(bytes) = payload else {
        return Ok(Vec::new());
    };
    let value: Value = serde_json::from_slice(bytes)?;
    Ok(match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        single => vec![single],
    })
}

/// Encode a single result value (workflow results, activity results, marker
/// details are all scalar JSON).
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, PayloadError> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a single result value. A missing payload decodes as JSON `null`.
pub fn decode_value<T: DeserializeOwned>(payload: Option<&[u8]>) -> Result<T, PayloadError> {
    match payload {
        Some(bytes) => Ok(serde_json::from_slice(bytes)?),
        None => Ok(serde_json::from_value(Value::Null)?),
    }
}

//! The uniform response envelope shared by every front end.
//!
//! On the wire an [`ActionResult`] is exactly one of
//!
//! ```json
//! { "success": true,  "output": { ... } }
//! { "success": false, "error": "..." }
//! ```
//!
//! The enum makes the mixed shapes unrepresentable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::ser::SerializeStruct;
use serde_json::Value;

use crate::error::IntentError;

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Success(Value),
    Failure(String),
}

impl ActionResult {
    /// Wrap a serializable output.  A serialization failure becomes a failure
    /// envelope rather than a panic.
    pub fn success<T: Serialize>(output: T) -> Self {
        match serde_json::to_value(output) {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Failure(IntentError::from(e).to_string()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(message) => Some(message),
        }
    }
}

impl From<IntentError> for ActionResult {
    fn from(err: IntentError) -> Self {
        Self::Failure(err.to_string())
    }
}

impl Serialize for ActionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ActionResult", 2)?;
        match self {
            Self::Success(output) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("output", output)?;
            }
            Self::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    success: bool,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl<'de> Deserialize<'de> for ActionResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEnvelope::deserialize(deserializer)?;
        match (raw.success, raw.output, raw.error) {
            (true, Some(output), None) => Ok(Self::Success(output)),
            (false, None, Some(error)) => Ok(Self::Failure(error)),
            _ => Err(serde::de::Error::custom(
                "envelope must be {success: true, output} or {success: false, error}",
            )),
        }
    }
}

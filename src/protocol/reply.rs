//! Interpretation of command reply payloads.
//!
//! The state server answers every command with either
//! `{"id": n, "result": ...}` or `{"id": n, "error": "...", "tb": "..."}`.
//! The traceback is only present when the command itself raised.

use serde_json::Value;

use crate::error::ClientError;

/// A classified command reply.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// The command completed; holds its `result` (or `null` if absent).
    Success(Value),
    /// The server rejected or failed the command.
    Failure {
        /// Error description.
        message: String,
        /// Server-side traceback, if attached.
        traceback: Option<String>,
    },
}

impl CommandReply {
    /// Classifies a raw reply payload.
    ///
    /// An `error` field wins over `result`. Non-string error values are
    /// rendered as JSON text.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        if let Some(error) = payload.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let traceback = payload
                .get("tb")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Self::Failure { message, traceback };
        }

        Self::Success(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Converts the reply into the command's result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Command`] for a failure reply.
    pub fn into_result(self) -> Result<Value, ClientError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure { message, traceback } => {
                Err(ClientError::Command { message, traceback })
            }
        }
    }
}

//! Outbound and inbound message types.

use serde::Serialize;
use serde_json::{Map, Value};

/// Frames sent from the client to the state server.
///
/// Serialized untagged: each variant becomes a bare JSON object whose
/// field names identify its kind.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Invoke `command` on the node at `path`.
    Command {
        /// Target state path.
        path: String,
        /// Command name registered at `path`.
        command: String,
        /// Positional arguments.
        args: Vec<Value>,
        /// Keyword arguments.
        kwargs: Map<String, Value>,
        /// Serial correlating the reply.
        id: u64,
    },
    /// Start receiving pushes for a path.
    Subscribe {
        /// Path to subscribe to.
        subscribe: String,
    },
    /// Stop receiving pushes for a path.
    Unsubscribe {
        /// Path to unsubscribe from.
        unsubscribe: String,
    },
}

impl OutboundMessage {
    /// Builds a subscribe control message.
    #[must_use]
    pub fn subscribe(path: impl Into<String>) -> Self {
        Self::Subscribe {
            subscribe: path.into(),
        }
    }

    /// Builds an unsubscribe control message.
    #[must_use]
    pub fn unsubscribe(path: impl Into<String>) -> Self {
        Self::Unsubscribe {
            unsubscribe: path.into(),
        }
    }

    /// Serializes the message to its JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if an argument value cannot be
    /// serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames received from the state server, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A reply to a command; `payload` is the whole frame.
    Reply {
        /// Serial of the command being answered.
        id: u64,
        /// Complete reply document, including `id`.
        payload: Value,
    },
    /// A state push for a subscribed path.
    Push {
        /// Subscribed path.
        path: String,
        /// New state, `None` when the frame carried no `state` field.
        state: Option<Value>,
    },
    /// A well-formed document matching neither shape.
    Unrecognized(Value),
}

impl InboundMessage {
    /// Parses and classifies a text frame.
    ///
    /// A frame with an `id` field is always treated as a reply; an `id`
    /// that is not an unsigned integer can never match a serial and is
    /// reported as [`InboundMessage::Unrecognized`].
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the text is not valid JSON.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::classify(value))
    }

    /// Classifies an already-parsed document.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Unrecognized(value);
        };

        if let Some(id) = obj.get("id") {
            return match id.as_u64() {
                Some(id) => Self::Reply { id, payload: value },
                None => Self::Unrecognized(value),
            };
        }

        if let Some(path) = obj.get("subscription").and_then(Value::as_str) {
            return Self::Push {
                path: path.to_string(),
                state: obj.get("state").cloned(),
            };
        }

        Self::Unrecognized(value)
    }
}

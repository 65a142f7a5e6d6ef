//! Client error types.
//!
//! [`ClientError`] is the single error type of the crate. Command futures
//! fail with it, transport handles report through it, and configuration
//! loading surfaces it at startup.

/// Errors produced by the connection, its transports, and configuration.
///
/// # Failure Classes
///
/// | Variant            | Raised by                                   |
/// |--------------------|---------------------------------------------|
/// | `ConnectionClosed` | pending commands when the connection drops  |
/// | `Transport`        | transport handles on send/close             |
/// | `Serialization`    | encoding outbound or decoding inbound JSON  |
/// | `InvalidEndpoint`  | endpoint derivation from a base URL         |
/// | `Command`          | a reply carrying an `error` field           |
/// | `Config`           | malformed configuration values              |
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection was torn down before a reply arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// The underlying transport failed to send or close.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message could not be serialized or parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An endpoint URL could not be parsed or converted.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The server executed the command and reported a failure.
    #[error("command failed: {message}")]
    Command {
        /// Error description sent by the server.
        message: String,
        /// Server-side traceback, when one was attached.
        traceback: Option<String>,
    },

    /// A configuration value was present but malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns `true` when the error stems from losing or failing the
    /// connection rather than from the server's answer.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Transport(_))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn connection_closed_display() {
        assert_eq!(ClientError::ConnectionClosed.to_string(), "connection closed");
    }

    #[test]
    fn command_display_uses_message() {
        let err = ClientError::Command {
            message: "KeyError('x')".to_string(),
            traceback: Some("Traceback ...".to_string()),
        };
        assert_eq!(err.to_string(), "command failed: KeyError('x')");
    }

    #[test]
    fn serde_errors_convert() {
        let Err(json_err) = serde_json::from_str::<serde_json::Value>("{not json") else {
            panic!("expected a parse failure");
        };
        let err: ClientError = json_err.into();
        assert!(matches!(err, ClientError::Serialization(_)));
    }

    #[test]
    fn connection_error_classification() {
        assert!(ClientError::ConnectionClosed.is_connection_error());
        assert!(ClientError::Transport("reset".to_string()).is_connection_error());
        assert!(!ClientError::Config("bad".to_string()).is_connection_error());
        assert!(
            !ClientError::Command {
                message: "nope".to_string(),
                traceback: None,
            }
            .is_connection_error()
        );
    }
}

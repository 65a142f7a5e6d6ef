//! Client configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Parsing goes through [`ClientConfig::from_lookup`] so it can
//! be exercised without touching the process environment.

use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::client::DEFAULT_LIFECYCLE_CAPACITY;
use crate::error::ClientError;

/// Base URL used when neither `STATEWIRE_URL` nor `STATEWIRE_BASE_URL` is set.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";

/// A command to invoke once the connection opens.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    /// Target state path.
    pub path: String,
    /// Command name.
    pub command: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
}

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// WebSocket endpoint of the state server.
    pub endpoint: String,

    /// State paths to watch.
    pub paths: Vec<String>,

    /// Delay before reconnecting after a close or error; zero disables
    /// reconnecting.
    pub reconnect_delay: Duration,

    /// Capacity of the lifecycle broadcast channel.
    pub lifecycle_capacity: usize,

    /// Command to run on every open, if any.
    pub command: Option<CommandSpec>,
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if the endpoint cannot be
    /// derived, or [`ClientError::Config`] if the configured command is
    /// malformed.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Numeric settings fall back to their defaults when missing or
    /// unparseable.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = match lookup("STATEWIRE_URL") {
            Some(url) => url,
            None => {
                let base = lookup("STATEWIRE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
                endpoint_from_base(&base)?
            }
        };

        let paths = lookup("STATEWIRE_PATHS")
            .map(|raw| parse_paths(&raw))
            .filter(|paths| !paths.is_empty())
            .unwrap_or_else(|| vec!["/".to_string()]);

        let reconnect_delay =
            Duration::from_secs(parse_var(&lookup, "STATEWIRE_RECONNECT_DELAY_SECS", 2));
        let lifecycle_capacity = parse_var(
            &lookup,
            "STATEWIRE_LIFECYCLE_CAPACITY",
            DEFAULT_LIFECYCLE_CAPACITY,
        );

        let command = match lookup("STATEWIRE_COMMAND") {
            Some(raw) => Some(parse_command(
                &raw,
                lookup("STATEWIRE_COMMAND_ARGS").as_deref(),
                lookup("STATEWIRE_COMMAND_KWARGS").as_deref(),
            )?),
            None => None,
        };

        Ok(Self {
            endpoint,
            paths,
            reconnect_delay,
            lifecycle_capacity,
            command,
        })
    }
}

/// Derives the state endpoint from an HTTP base URL.
///
/// Resolves `state` relative to `base` and switches the scheme to `ws`
/// (or `wss` for `https`). WebSocket base URLs keep their scheme.
///
/// # Errors
///
/// Returns [`ClientError::InvalidEndpoint`] if `base` is not a URL or uses
/// a scheme other than http(s) or ws(s).
pub fn endpoint_from_base(base: &str) -> Result<String, ClientError> {
    let base = Url::parse(base).map_err(|e| ClientError::InvalidEndpoint(format!("{base}: {e}")))?;
    let mut url = base
        .join("state")
        .map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidEndpoint(format!(
                "unsupported scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::InvalidEndpoint(format!("cannot switch scheme of {url}")))?;
    Ok(url.into())
}

/// Splits a comma-separated path list, dropping blanks.
fn parse_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `STATEWIRE_COMMAND` (`"<path> <command>"`) and its JSON arguments.
fn parse_command(
    raw: &str,
    args: Option<&str>,
    kwargs: Option<&str>,
) -> Result<CommandSpec, ClientError> {
    let mut parts = raw.split_whitespace();
    let (Some(path), Some(command), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ClientError::Config(format!(
            "STATEWIRE_COMMAND must be \"<path> <command>\", got {raw:?}"
        )));
    };

    let args: Vec<Value> = match args {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| ClientError::Config(format!("STATEWIRE_COMMAND_ARGS: {e}")))?,
        None => Vec::new(),
    };
    let kwargs: Map<String, Value> = match kwargs {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| ClientError::Config(format!("STATEWIRE_COMMAND_KWARGS: {e}")))?,
        None => Map::new(),
    };

    Ok(CommandSpec {
        path: path.to_string(),
        command: command.to_string(),
        args,
        kwargs,
    })
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use serde_json::json;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ClientError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let Ok(config) = load(&[]) else {
            panic!("defaults should load");
        };
        assert_eq!(config.endpoint, "ws://127.0.0.1:8000/state");
        assert_eq!(config.paths, vec!["/"]);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.lifecycle_capacity, DEFAULT_LIFECYCLE_CAPACITY);
        assert!(config.command.is_none());
    }

    #[test]
    fn explicit_url_wins_over_base() {
        let Ok(config) = load(&[
            ("STATEWIRE_URL", "ws://example:9/custom"),
            ("STATEWIRE_BASE_URL", "http://ignored/"),
        ]) else {
            panic!("config should load");
        };
        assert_eq!(config.endpoint, "ws://example:9/custom");
    }

    #[test]
    fn endpoint_derivation() {
        assert_eq!(
            endpoint_from_base("https://host/inspector/").ok().as_deref(),
            Some("wss://host/inspector/state")
        );
        assert_eq!(
            endpoint_from_base("http://host:8000/index.html").ok().as_deref(),
            Some("ws://host:8000/state")
        );
        assert!(matches!(
            endpoint_from_base("ftp://host/"),
            Err(ClientError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            endpoint_from_base("not a url"),
            Err(ClientError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn paths_and_numbers() {
        let Ok(config) = load(&[
            ("STATEWIRE_PATHS", " /a, ,/b/c ,"),
            ("STATEWIRE_RECONNECT_DELAY_SECS", "0"),
            ("STATEWIRE_LIFECYCLE_CAPACITY", "oops"),
        ]) else {
            panic!("config should load");
        };
        assert_eq!(config.paths, vec!["/a", "/b/c"]);
        assert_eq!(config.reconnect_delay, Duration::ZERO);
        assert_eq!(config.lifecycle_capacity, DEFAULT_LIFECYCLE_CAPACITY);
    }

    #[test]
    fn command_with_arguments() {
        let Ok(config) = load(&[
            ("STATEWIRE_COMMAND", "/plugins restart"),
            ("STATEWIRE_COMMAND_ARGS", r#"["web", 2]"#),
            ("STATEWIRE_COMMAND_KWARGS", r#"{"force": true}"#),
        ]) else {
            panic!("config should load");
        };
        let Some(cmd) = config.command else {
            panic!("command should be configured");
        };
        assert_eq!(cmd.path, "/plugins");
        assert_eq!(cmd.command, "restart");
        assert_eq!(cmd.args, vec![json!("web"), json!(2)]);
        assert_eq!(cmd.kwargs.get("force"), Some(&json!(true)));
    }

    #[test]
    fn malformed_command_is_rejected() {
        assert!(matches!(
            load(&[("STATEWIRE_COMMAND", "/only-path")]),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            load(&[
                ("STATEWIRE_COMMAND", "/p cmd"),
                ("STATEWIRE_COMMAND_ARGS", "{\"not\":\"a list\"}"),
            ]),
            Err(ClientError::Config(_))
        ));
    }
}

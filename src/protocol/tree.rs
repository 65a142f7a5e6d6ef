//! Decoding of pushed tree summaries.
//!
//! A subscribed path pushes a flat listing of its node: first the
//! commands registered at the node, then one entry per child. Container
//! children carry the path to subscribe to next and their size; scalar
//! children carry their value inline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

/// One line of a node listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Mapping key of the child; absent for list elements and commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Path of a container child, suitable for a nested subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Opening and closing brackets for a container child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<(String, String)>,
    /// Number of elements in a container child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<u64>,
    /// Inline value of a scalar child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Name of a command registered at the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Command metadata and any fields this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TreeEntry {
    /// Returns `true` for a command descriptor.
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }

    /// Returns `true` for a container child that can be subscribed to.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.command.is_none() && self.path.is_some()
    }
}

impl fmt::Display for TreeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(command) = &self.command {
            return write!(f, "{command}()");
        }

        if let Some(key) = &self.key {
            write!(f, "{key}: ")?;
        }

        match (&self.symbols, self.items) {
            (Some((open, close)), Some(items)) => write!(f, "{open}{items}{close}"),
            _ => match &self.value {
                Some(value) => write!(f, "{value}"),
                None => f.write_str("null"),
            },
        }
    }
}

/// Decodes a pushed state into its entries.
///
/// # Errors
///
/// Returns [`ClientError::Serialization`] if the state is not a list of
/// entry objects.
pub fn decode_tree(state: &Value) -> Result<Vec<TreeEntry>, ClientError> {
    Ok(Vec::<TreeEntry>::deserialize(state)?)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!([
            {"command": "restart", "doc": "Restart the plugin"},
            {"key": "config", "path": "/config", "symbols": ["{", "}"], "items": 3},
            {"key": "name", "value": "inspector"},
            {"path": "/list/[0]", "symbols": ["[", "]"], "items": 0},
            {"value": 12}
        ])
    }

    #[test]
    fn decodes_mixed_listing() {
        let Ok(entries) = decode_tree(&sample()) else {
            panic!("sample should decode");
        };
        assert_eq!(entries.len(), 5);

        let kinds: Vec<(bool, bool)> = entries
            .iter()
            .map(|e| (e.is_command(), e.is_branch()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (true, false),
                (false, true),
                (false, false),
                (false, true),
                (false, false)
            ]
        );
    }

    #[test]
    fn command_metadata_lands_in_extra() {
        let Ok(entries) = decode_tree(&sample()) else {
            panic!("sample should decode");
        };
        let Some(first) = entries.first() else {
            panic!("missing first entry");
        };
        assert_eq!(first.extra.get("doc"), Some(&json!("Restart the plugin")));
    }

    #[test]
    fn display_renders_each_kind() {
        let Ok(entries) = decode_tree(&sample()) else {
            panic!("sample should decode");
        };
        let lines: Vec<String> = entries.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec!["restart()", "config: {3}", "name: \"inspector\"", "[0]", "12"]
        );
    }

    #[test]
    fn non_list_state_is_rejected() {
        let err = decode_tree(&json!({"not": "a list"}));
        assert!(matches!(err, Err(ClientError::Serialization(_))));
    }
}

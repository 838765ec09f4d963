//! Session result, the persisted outcome of a successful up.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Merged devcontainer configuration as reported by the agent.
///
/// Only the fields the local side acts on are typed; the rest is carried
/// through untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_user: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Substitution context used when expanding paths for post actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionContext {
    #[serde(default)]
    pub container_workspace_folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_user: Option<String>,
}

/// Outcome of a session.
///
/// Created exactly once per successful up and persisted next to the
/// workspace config; immutable until the next successful up overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    #[serde(default)]
    pub merged_config: MergedConfig,
    #[serde(default)]
    pub substitution_context: SubstitutionContext,
    /// Provider-specific extras.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, Value>,
}

impl SessionResult {
    /// The user to connect to the container as, defaulting to root.
    #[must_use]
    pub fn remote_user(&self) -> &str {
        self.substitution_context
            .remote_user
            .as_deref()
            .or(self.merged_config.remote_user.as_deref())
            .unwrap_or("root")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_user_falls_back_to_root() {
        let result = SessionResult::default();
        assert_eq!(result.remote_user(), "root");

        let result = SessionResult {
            merged_config: MergedConfig {
                remote_user: Some("vscode".to_string()),
                ..MergedConfig::default()
            },
            ..SessionResult::default()
        };
        assert_eq!(result.remote_user(), "vscode");
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let json = r#"{
            "merged_config": {"workspace_folder": "/workspace", "init": true},
            "substitution_context": {"container_workspace_folder": "/workspace"}
        }"#;
        let result: SessionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.merged_config.extra["init"], Value::Bool(true));
        let back = serde_json::to_value(&result).unwrap();
        assert_eq!(back["merged_config"]["init"], Value::Bool(true));
    }
}

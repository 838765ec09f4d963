//! Remote agent descriptor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time the remote side gets to receive and start the agent.
pub const DEFAULT_INJECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Where the remote agent lives and how it is injected.
///
/// Fetched once per session from the backend and cached for the session's
/// lifetime; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Absolute path of the agent binary on the remote side.
    pub agent_path: String,
    /// Download URL used as a fallback when no local binary is streamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_url: Option<String>,
    /// Injection timeout in seconds. Zero falls back to the default.
    #[serde(default)]
    pub inject_timeout_secs: u64,
    /// If true the agent is expected to already run locally; no injection.
    #[serde(default)]
    pub local: bool,
    /// Directory the agent uses for its own state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl AgentInfo {
    /// Injection timeout with the non-zero default applied.
    #[must_use]
    pub fn inject_timeout(&self) -> Duration {
        if self.inject_timeout_secs == 0 {
            DEFAULT_INJECT_TIMEOUT
        } else {
            Duration::from_secs(self.inject_timeout_secs)
        }
    }
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            agent_path: "/tmp/devws/agent".to_string(),
            agent_url: None,
            inject_timeout_secs: 0,
            local: false,
            data_dir: None,
        }
    }
}

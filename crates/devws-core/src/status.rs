//! Soft workspace states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Observable state of a workspace.
///
/// These are values, not errors: a stopped or missing workspace is a normal
/// answer to a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceStatus {
    Running,
    /// Exists but is not running.
    Stopped,
    /// Temporarily unaccessible, usually resolves itself.
    Busy,
    NotFound,
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Busy => "busy",
            Self::NotFound => "not-found",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkspaceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "busy" => Ok(Self::Busy),
            "not-found" | "notfound" => Ok(Self::NotFound),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status string no backend is expected to produce.
#[derive(Debug, thiserror::Error)]
#[error("unknown workspace status: {0}")]
pub struct UnknownStatus(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_states() {
        assert_eq!(
            "Running".parse::<WorkspaceStatus>().unwrap(),
            WorkspaceStatus::Running
        );
        assert_eq!(
            "not-found".parse::<WorkspaceStatus>().unwrap(),
            WorkspaceStatus::NotFound
        );
        assert!("exploded".parse::<WorkspaceStatus>().is_err());
    }
}

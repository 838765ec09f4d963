//! Already-decoded CLI options consumed by the session layer.
//!
//! Flag parsing and environment decoding happen outside this workspace; the
//! session layer only ever sees these structs.

use serde::{Deserialize, Serialize};

/// Options for the up operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpOptions {
    /// Workspace id to use, empty to derive from the source.
    #[serde(default)]
    pub id: String,
    /// Workspace source in its compact string form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// IDE to open, empty for the workspace default.
    #[serde(default)]
    pub ide: String,
    /// IDE options in KEY=VALUE form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ide_options: Vec<String>,
    /// Provider options in KEY=VALUE form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_options: Vec<String>,
    /// devcontainer.json path override, relative to the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devcontainer_path: Option<String>,
    /// Container image override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devcontainer_image: Option<String>,
    /// Remove existing containers and recreate them.
    #[serde(default)]
    pub recreate: bool,
    /// Like recreate, but also removes sources.
    #[serde(default)]
    pub reset: bool,
    /// Extra env variables for the workspace, KEY=VALUE.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspace_env: Vec<String>,
    /// Answer git credential requests coming back through the tunnel.
    #[serde(default)]
    pub inject_git_credentials: bool,
    /// Answer docker credential requests coming back through the tunnel.
    #[serde(default)]
    pub inject_docker_credentials: bool,
    /// Platform mode: session is driven by an external platform, locking
    /// and post actions are skipped.
    #[serde(default)]
    pub platform: bool,
    /// Verbose progress.
    #[serde(default)]
    pub debug: bool,
}

/// Options for status queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusOptions {
    /// Also query the workspace container state, not just the machine.
    #[serde(default)]
    pub container_status: bool,
}

//! Workspace configuration and source descriptors.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the workspace content comes from.
///
/// The CLI accepts the compact string forms `git:<url>`, `local:<path>`,
/// `image:<ref>` and `container:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkspaceSource {
    /// A git repository, optionally with a sub path inside the checkout.
    Git {
        repository: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sub_path: Option<String>,
    },
    /// A folder on the local machine.
    LocalFolder { path: PathBuf },
    /// A container image reference.
    Image { image: String },
    /// An already running container.
    Container { id: String },
}

impl WorkspaceSource {
    /// Parse the compact `<scheme>:<value>` string form.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let (scheme, rest) = input.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        match scheme {
            "git" => Some(Self::Git {
                repository: rest.to_string(),
                sub_path: None,
            }),
            "local" => Some(Self::LocalFolder {
                path: PathBuf::from(rest),
            }),
            "image" => Some(Self::Image {
                image: rest.to_string(),
            }),
            "container" => Some(Self::Container {
                id: rest.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for WorkspaceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Git { repository, .. } => write!(f, "git:{repository}"),
            Self::LocalFolder { path } => write!(f, "local:{}", path.display()),
            Self::Image { image } => write!(f, "image:{image}"),
            Self::Container { id } => write!(f, "container:{id}"),
        }
    }
}

/// Provider selected for a workspace, with local option overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRef {
    pub name: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// IDE selected for a workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdeConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Reference to the machine a workspace runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRef {
    pub id: String,
}

/// Configuration of a single workspace.
///
/// Owned by local filesystem state; created on first resolution and mutated
/// only by IDE/provider selection, never by the tunnel itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace id, unique within a context.
    pub id: String,
    /// Globally unique id.
    pub uid: String,
    /// Context this workspace belongs to.
    pub context: String,
    /// Chosen provider and its option overrides.
    pub provider: ProviderRef,
    /// Workspace content source.
    pub source: WorkspaceSource,
    /// Selected IDE.
    #[serde(default)]
    pub ide: IdeConfig,
    /// Machine this workspace runs on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<MachineRef>,
    /// Path this config was loaded from. Not persisted.
    #[serde(skip)]
    pub origin: Option<PathBuf>,
}

impl WorkspaceConfig {
    /// Create a new workspace config with a fresh UID.
    #[must_use]
    pub fn new(id: impl Into<String>, context: impl Into<String>, source: WorkspaceSource) -> Self {
        Self {
            id: id.into(),
            uid: Uuid::new_v4().to_string(),
            context: context.into(),
            provider: ProviderRef::default(),
            source,
            ide: IdeConfig::default(),
            machine: None,
            origin: None,
        }
    }
}

//! On-disk workspace state.
//!
//! Layout: `<root>/contexts/<context>/workspaces/<id>/workspace.json` with
//! `result.json` written next to it after every successful up. Writes go
//! through a temp file plus rename so a crash never leaves half a file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::result::SessionResult;
use crate::workspace::WorkspaceConfig;

const WORKSPACE_FILE: &str = "workspace.json";
const RESULT_FILE: &str = "result.json";

/// Store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workspace not found: {0}")]
    NotFound(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid workspace state at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Filesystem-backed workspace store.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted in the user's data directory.
    #[must_use]
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|dir| Self::new(dir.join("devws")))
    }

    /// Directory holding all state for one workspace.
    #[must_use]
    pub fn workspace_dir(&self, context: &str, id: &str) -> PathBuf {
        self.root
            .join("contexts")
            .join(context)
            .join("workspaces")
            .join(id)
    }

    /// Persist a workspace config.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or written.
    pub fn save_config(&self, config: &WorkspaceConfig) -> Result<(), StoreError> {
        let dir = self.workspace_dir(&config.context, &config.id);
        write_json(&dir.join(WORKSPACE_FILE), config)
    }

    /// Load a workspace config.
    ///
    /// # Errors
    /// Returns `NotFound` if the workspace does not exist.
    pub fn load_config(&self, context: &str, id: &str) -> Result<WorkspaceConfig, StoreError> {
        let path = self.workspace_dir(context, id).join(WORKSPACE_FILE);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let mut config: WorkspaceConfig = read_json(&path)?;
        config.origin = Some(path);
        Ok(config)
    }

    /// Persist the session result next to the workspace config, replacing
    /// any previous result.
    ///
    /// # Errors
    /// Returns an error if the result cannot be written.
    pub fn save_result(
        &self,
        workspace: &WorkspaceConfig,
        result: &SessionResult,
    ) -> Result<(), StoreError> {
        let dir = self.workspace_dir(&workspace.context, &workspace.id);
        write_json(&dir.join(RESULT_FILE), result)
    }

    /// Load the last session result, if any.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_result(
        &self,
        workspace: &WorkspaceConfig,
    ) -> Result<Option<SessionResult>, StoreError> {
        let path = self
            .workspace_dir(&workspace.context, &workspace.id)
            .join(RESULT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// List all workspaces in a context.
    ///
    /// Broken entries are skipped with a warning instead of failing the
    /// whole listing.
    ///
    /// # Errors
    /// Returns an error only if the workspaces directory itself is
    /// unreadable.
    pub fn list_workspaces(&self, context: &str) -> Result<Vec<WorkspaceConfig>, StoreError> {
        let dir = self.root.join("contexts").join(context).join("workspaces");
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(StoreError::Io {
                    path: dir,
                    source: err,
                });
            }
        };

        let mut workspaces = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            match self.load_config(context, name) {
                Ok(config) => workspaces.push(config),
                Err(err) => {
                    tracing::warn!("couldn't load workspace {name}: {err}");
                }
            }
        }
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workspaces)
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or(path);
    fs::create_dir_all(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let data = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let data = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

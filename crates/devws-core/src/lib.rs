//! Core data model for remote dev workspaces.
//!
//! This crate provides the fundamental building blocks:
//! - `WorkspaceConfig` - Identity and provider selection for a workspace
//! - `SessionResult` - Persisted outcome of a successful up session
//! - `AgentInfo` - Remote agent location and injection parameters
//! - `LogMessage` / `Logger` - Leveled progress logging threaded explicitly
//! - `WorkspaceStore` - On-disk workspace configuration and result state

pub mod agent;
pub mod log;
pub mod options;
pub mod result;
pub mod status;
pub mod store;
pub mod workspace;

pub use agent::AgentInfo;
pub use log::{LogLevel, LogMessage, Logger};
pub use options::{StatusOptions, UpOptions};
pub use result::SessionResult;
pub use status::WorkspaceStatus;
pub use store::{StoreError, WorkspaceStore};
pub use workspace::{WorkspaceConfig, WorkspaceSource};

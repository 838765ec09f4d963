//! Client error taxonomy.

use std::io;
use std::time::Duration;

use thiserror::Error;

use devws_core::status::UnknownStatus;
use devws_core::store::StoreError;
use devws_tunnel::TunnelError;

/// Errors produced by workspace client operations.
///
/// Wrapped with enough context (workspace id, provider, operation) to be
/// actionable at the top level; none of these are retried automatically.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The workspace is already locked by another operation.
    #[error("workspace {workspace} in context {context} is locked by another operation")]
    LockContention { context: String, workspace: String },

    /// The daemon socket could not be reached. Distinguished from other
    /// network errors and names the responsible provider.
    #[error("daemon of provider {provider} is not available: {source}")]
    DaemonUnavailable {
        provider: String,
        #[source]
        source: io::Error,
    },

    /// A daemon request came back with a non-200 status.
    #[error("daemon request failed with status {status}: {message}")]
    DaemonRequest { status: u16, message: String },

    /// The remote side did not accept the agent within the inject timeout.
    #[error("remote agent injection timed out after {}s", timeout.as_secs())]
    AgentInjectionTimeout { timeout: Duration },

    /// A remote command exited non-zero or its stream closed without a
    /// terminal result.
    #[error("remote command failed (exit code {exit_code:?}): {stderr}")]
    RemoteCommand {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    /// The backend has no implementation for the requested operation.
    #[error("the {backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("backend reported an unexpected status: {0}")]
    Status(#[from] UnknownStatus),

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("daemon transport error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("daemon request could not be built: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("invalid command argument: {0}")]
    Quote(#[from] shlex::QuoteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

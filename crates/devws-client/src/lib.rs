//! Workspace client backends.
//!
//! One workspace is operated through exactly one of three backends:
//! - `MachineClient` - SSH-reachable host, agent injected over the wire
//! - `ProxyClient` - provider-supplied subprocess, tunnel server runs locally
//! - `DaemonClient` - local background daemon over a unix socket
//!
//! `WorkspaceClient` is the closed sum over the three; adding a backend is
//! a compile-time-checked exhaustive match, not a fallback branch.

pub mod client;
pub mod daemon;
pub mod error;
pub mod inject;
pub mod lock;
pub mod machine;
pub mod proxy;
pub mod runner;

pub use client::WorkspaceClient;
pub use daemon::{DaemonClient, DaemonStatus, LocalDaemonClient, WorkspaceInstance};
pub use error::ClientError;
pub use inject::AgentInjector;
pub use lock::{LockGuard, LockState, SessionLock};
pub use machine::MachineClient;
pub use proxy::ProxyClient;
pub use runner::{CommandExit, CommandOutput, CommandRunner, RunningCommand, SshCommandRunner};

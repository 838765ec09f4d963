//! The closed set of workspace backends.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use devws_core::log::Logger;
use devws_core::{SessionResult, StatusOptions, UpOptions, WorkspaceConfig, WorkspaceStatus};
use devws_tunnel::CredentialBroker;

use crate::daemon::DaemonClient;
use crate::error::ClientError;
use crate::lock::LockState;
use crate::machine::MachineClient;
use crate::proxy::ProxyClient;

const STATUS_TIMEOUT: Duration = Duration::from_secs(30);

/// One workspace, operated through exactly one backend.
///
/// A closed enum rather than a trait object: every operation is an
/// exhaustive match, so a new backend cannot be added without deciding
/// each operation's behavior for it.
pub enum WorkspaceClient {
    Machine(MachineClient),
    Proxy(ProxyClient),
    Daemon(DaemonClient),
}

impl WorkspaceClient {
    #[must_use]
    pub fn workspace(&self) -> &WorkspaceConfig {
        match self {
            Self::Machine(client) => client.workspace(),
            Self::Proxy(client) => client.workspace(),
            Self::Daemon(client) => client.workspace(),
        }
    }

    /// The store holding this workspace's persisted state.
    #[must_use]
    pub fn store(&self) -> &devws_core::WorkspaceStore {
        match self {
            Self::Machine(client) => client.store(),
            Self::Proxy(client) => client.store(),
            Self::Daemon(client) => client.store(),
        }
    }

    /// The workspace's context name.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.workspace().context
    }

    /// The provider responsible for this workspace.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.workspace().provider.name
    }

    fn lock_state(&self) -> &LockState {
        match self {
            Self::Machine(client) => client.lock(),
            Self::Proxy(client) => client.lock(),
            Self::Daemon(client) => client.lock(),
        }
    }

    /// Acquire the workspace's exclusive session lock.
    ///
    /// # Errors
    /// Returns `LockContention` when another operation holds it.
    pub fn lock(&self) -> Result<(), ClientError> {
        self.lock_state().acquire()
    }

    /// Acquire the session lock, waiting until it is free.
    ///
    /// # Errors
    /// Returns `Canceled` when the token fires first.
    pub async fn lock_wait(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        self.lock_state().acquire_wait(cancel).await
    }

    /// Release the session lock. A no-op when it is not held.
    pub fn unlock(&self) {
        self.lock_state().release();
    }

    /// Run an up session on this backend.
    ///
    /// # Errors
    /// Returns the backend's error when the session fails; the session
    /// result is never partially applied.
    pub async fn up(
        &self,
        options: &UpOptions,
        cancel: &CancellationToken,
        logger: &dyn Logger,
        broker: Arc<dyn CredentialBroker>,
    ) -> Result<SessionResult, ClientError> {
        match self {
            Self::Machine(client) => client.up(options, cancel, logger, broker).await,
            Self::Proxy(client) => client.up(options, cancel, logger, broker).await,
            Self::Daemon(client) => {
                tokio::select! {
                    () = cancel.cancelled() => Err(ClientError::Canceled),
                    result = client.up(options) => result,
                }
            }
        }
    }

    /// Run a raw command on the workspace's execution target.
    ///
    /// Only the machine backend has one; proxy subprocesses and the
    /// daemon expose no command surface, so those refuse explicitly.
    ///
    /// # Errors
    /// Returns `Unsupported` for the proxy and daemon backends, or the
    /// machine backend's error when execution fails.
    pub async fn command(
        &self,
        command: &str,
        stdin: &[u8],
    ) -> Result<crate::runner::CommandOutput, ClientError> {
        match self {
            Self::Machine(client) => client.command(command, stdin).await,
            Self::Proxy(_) => Err(ClientError::Unsupported {
                backend: "proxy",
                operation: "command execution",
            }),
            Self::Daemon(_) => Err(ClientError::Unsupported {
                backend: "daemon",
                operation: "command execution",
            }),
        }
    }

    /// The remote agent descriptor for this session.
    ///
    /// Only the machine backend injects an agent; the proxy subprocess
    /// and the daemon manage their own remote side.
    ///
    /// # Errors
    /// Returns `Unsupported` for the proxy and daemon backends.
    pub fn agent_info(&self) -> Result<&devws_core::AgentInfo, ClientError> {
        match self {
            Self::Machine(client) => Ok(client.agent_info()),
            Self::Proxy(_) => Err(ClientError::Unsupported {
                backend: "proxy",
                operation: "agent injection",
            }),
            Self::Daemon(_) => Err(ClientError::Unsupported {
                backend: "daemon",
                operation: "agent injection",
            }),
        }
    }

    /// Query the workspace status, bounded by a hard timeout so a stuck
    /// backend cannot hang a status listing.
    ///
    /// # Errors
    /// Returns the backend's error, or a timed-out I/O error when no
    /// answer arrives in time.
    pub async fn status(&self, options: &StatusOptions) -> Result<WorkspaceStatus, ClientError> {
        let query = async {
            match self {
                Self::Machine(client) => client.status(options).await,
                Self::Proxy(client) => client.status(options).await,
                Self::Daemon(client) => client.status(options).await,
            }
        };
        timeout(STATUS_TIMEOUT, query).await.map_err(|_| {
            ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("status query timed out after {}s", STATUS_TIMEOUT.as_secs()),
            ))
        })?
    }
}

#[cfg(test)]
mod tests {
    use devws_core::workspace::WorkspaceSource;
    use devws_core::WorkspaceStore;

    use super::*;
    use crate::lock::SessionLock;

    fn proxy_client(store: &WorkspaceStore) -> WorkspaceClient {
        let workspace = WorkspaceConfig::new(
            "w1",
            "default",
            WorkspaceSource::Git {
                repository: "https://github.com/acme/repo".to_string(),
                sub_path: None,
            },
        );
        let lock = LockState::new(SessionLock::new(store, "default", "w1"));
        WorkspaceClient::Proxy(ProxyClient::new(
            workspace,
            store.clone(),
            vec!["true".to_string()],
            None,
            lock,
        ))
    }

    #[tokio::test]
    async fn lock_round_trip_through_the_enum() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(tmp.path());
        let client = proxy_client(&store);

        client.lock().unwrap();
        assert!(matches!(
            client.lock(),
            Err(ClientError::LockContention { .. })
        ));
        client.unlock();
        client.lock().unwrap();
    }

    #[tokio::test]
    async fn backends_without_a_command_surface_refuse_explicitly() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(tmp.path());
        let client = proxy_client(&store);

        assert!(matches!(
            client.command("echo hi", &[]).await,
            Err(ClientError::Unsupported {
                backend: "proxy",
                ..
            })
        ));
        assert!(matches!(
            client.agent_info(),
            Err(ClientError::Unsupported {
                backend: "proxy",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn accessors_expose_workspace_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(tmp.path());
        let client = proxy_client(&store);

        assert_eq!(client.workspace().id, "w1");
        assert_eq!(client.context(), "default");
    }
}

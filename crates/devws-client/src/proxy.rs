//! Proxy backend.
//!
//! The provider ships its own tunnel-speaking binary. An up session spawns
//! that binary as a local subprocess group and drives the same tunnel
//! protocol over its stdio that the machine backend drives over SSH.

use std::process::Stdio;
use std::sync::Arc;

use command_group::AsyncCommandGroup;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use devws_core::log::Logger;
use devws_core::{
    SessionResult, StatusOptions, UpOptions, WorkspaceConfig, WorkspaceStatus, WorkspaceStore,
};
use devws_tunnel::{CredentialBroker, TunnelError, UpServerConfig, run_up_server};

use crate::error::ClientError;
use crate::lock::LockState;

/// Environment variable carrying the encoded up options to the provider
/// subprocess.
pub const UP_OPTIONS_ENV: &str = "DEVWS_UP_OPTIONS";

/// Workspace backend driven through a provider-supplied subprocess.
pub struct ProxyClient {
    workspace: WorkspaceConfig,
    store: WorkspaceStore,
    up_command: Vec<String>,
    status_command: Option<Vec<String>>,
    lock: LockState,
}

impl ProxyClient {
    #[must_use]
    pub fn new(
        workspace: WorkspaceConfig,
        store: WorkspaceStore,
        up_command: Vec<String>,
        status_command: Option<Vec<String>>,
        lock: LockState,
    ) -> Self {
        Self {
            workspace,
            store,
            up_command,
            status_command,
            lock,
        }
    }

    #[must_use]
    pub fn workspace(&self) -> &WorkspaceConfig {
        &self.workspace
    }

    #[must_use]
    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    #[must_use]
    pub fn lock(&self) -> &LockState {
        &self.lock
    }

    /// Run an up session through the provider subprocess.
    ///
    /// The subprocess is spawned as a process group so that cancellation
    /// tears down its whole tree, not just the immediate child.
    ///
    /// # Errors
    /// Returns an error when the subprocess cannot be spawned, exits
    /// without a result or exits non-zero.
    pub async fn up(
        &self,
        options: &UpOptions,
        cancel: &CancellationToken,
        logger: &dyn Logger,
        broker: Arc<dyn CredentialBroker>,
    ) -> Result<SessionResult, ClientError> {
        let Some((program, args)) = self.up_command.split_first() else {
            return Err(ClientError::ExecutableNotFound(
                "provider up command is empty".to_string(),
            ));
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .env(UP_OPTIONS_ENV, serde_json::to_string(options)?)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.group_spawn()?;
        let stdin = child
            .inner()
            .stdin
            .take()
            .ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or_else(|| missing_pipe("stdout"))?;
        let mut stderr = child
            .inner()
            .stderr
            .take()
            .ok_or_else(|| missing_pipe("stderr"))?;

        let config = UpServerConfig {
            workspace_id: self.workspace.id.clone(),
            inject_git_credentials: options.inject_git_credentials,
            inject_docker_credentials: options.inject_docker_credentials,
            broker,
        };

        let outcome = run_up_server(cancel, stdout, stdin, &config, logger).await;
        // on cancellation and protocol errors the child may still be
        // running; kill it so collecting stderr and the exit status below
        // cannot block on a lingering provider. ClosedWithoutResult means
        // the streams already hit EOF, so the child is on its way out.
        if !matches!(outcome, Ok(_) | Err(TunnelError::ClosedWithoutResult)) {
            let _ = child.start_kill();
        }

        let mut captured = Vec::new();
        let _ = stderr.read_to_end(&mut captured).await;
        let status = child.wait().await?;

        match outcome {
            Ok(result) => {
                if status.success() {
                    Ok(result)
                } else {
                    Err(ClientError::RemoteCommand {
                        exit_code: status.code(),
                        stderr: String::from_utf8_lossy(&captured).trim().to_string(),
                    })
                }
            }
            Err(TunnelError::ClosedWithoutResult) => Err(ClientError::RemoteCommand {
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&captured).trim().to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Current workspace status.
    ///
    /// Uses the provider's status command when one is configured. Without
    /// one the best local guess is used: a persisted result means the
    /// workspace exists but is not known to run.
    ///
    /// # Errors
    /// Returns an error when the status command fails or prints a status
    /// no backend is expected to produce.
    pub async fn status(&self, _options: &StatusOptions) -> Result<WorkspaceStatus, ClientError> {
        let Some(status_command) = &self.status_command else {
            return self.status_from_store();
        };
        let Some((program, args)) = status_command.split_first() else {
            return self.status_from_store();
        };

        let output = Command::new(program).args(args).output().await?;
        if !output.status.success() {
            return Err(ClientError::RemoteCommand {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().parse()?)
    }

    fn status_from_store(&self) -> Result<WorkspaceStatus, ClientError> {
        match self.store.load_result(&self.workspace)? {
            Some(_) => Ok(WorkspaceStatus::Stopped),
            None => Ok(WorkspaceStatus::NotFound),
        }
    }
}

fn missing_pipe(name: &str) -> ClientError {
    ClientError::Io(std::io::Error::other(format!(
        "provider subprocess has no {name} pipe"
    )))
}

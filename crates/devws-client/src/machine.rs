//! Machine backend.
//!
//! The workspace lives on an SSH-reachable host. An up session injects the
//! agent binary, starts it with piped stdio and drives the tunnel protocol
//! over those pipes until the agent reports its terminal result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use devws_core::log::Logger;
use devws_core::{
    AgentInfo, SessionResult, StatusOptions, UpOptions, WorkspaceConfig, WorkspaceStatus,
    WorkspaceStore,
};
use devws_tunnel::{CredentialBroker, TunnelError, UpServerConfig, run_up_server};

use crate::error::ClientError;
use crate::inject::AgentInjector;
use crate::lock::LockState;
use crate::runner::CommandRunner;

const REACHABLE_TIMEOUT: Duration = Duration::from_secs(30);
const REACHABLE_RETRY: Duration = Duration::from_secs(2);
const AGENT_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Workspace backend for a dedicated machine reached over SSH.
pub struct MachineClient {
    workspace: WorkspaceConfig,
    store: WorkspaceStore,
    agent: AgentInfo,
    runner: Arc<dyn CommandRunner>,
    expected_agent_version: String,
    local_agent_binary: Option<PathBuf>,
    lock: LockState,
}

impl MachineClient {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace: WorkspaceConfig,
        store: WorkspaceStore,
        agent: AgentInfo,
        runner: Arc<dyn CommandRunner>,
        expected_agent_version: impl Into<String>,
        local_agent_binary: Option<PathBuf>,
        lock: LockState,
    ) -> Self {
        Self {
            workspace,
            store,
            agent,
            runner,
            expected_agent_version: expected_agent_version.into(),
            local_agent_binary,
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

    /// The agent descriptor cached for this session.
    #[must_use]
    pub fn agent_info(&self) -> &AgentInfo {
        &self.agent
    }

    /// Run an up session on the machine.
    ///
    /// # Errors
    /// Returns an error when the machine is unreachable, the agent cannot
    /// be injected or the tunnel ends without a result.
    pub async fn up(
        &self,
        options: &UpOptions,
        cancel: &CancellationToken,
        logger: &dyn Logger,
        broker: Arc<dyn CredentialBroker>,
    ) -> Result<SessionResult, ClientError> {
        self.wait_until_reachable(cancel, logger).await?;

        let mut injector = AgentInjector::new(
            self.runner.clone(),
            self.agent.clone(),
            self.expected_agent_version.clone(),
            self.local_agent_binary.clone(),
        );
        injector.ensure_agent(logger).await?;

        let workspace_info = serde_json::to_string(&json!({
            "workspace": self.workspace,
            "options": options,
            "agent": self.agent,
        }))?;

        logger.info("Creating devcontainer...");
        let running = injector.start_agent(&workspace_info, options.debug).await?;
        let (stdin, stdout, wait) = running.into_parts();

        let config = UpServerConfig {
            workspace_id: self.workspace.id.clone(),
            inject_git_credentials: options.inject_git_credentials,
            inject_docker_credentials: options.inject_docker_credentials,
            broker,
        };

        match run_up_server(cancel, stdout, stdin, &config, logger).await {
            Ok(result) => {
                // the agent is expected to exit right after its result;
                // don't let a lingering process hold the session open
                match tokio::time::timeout(AGENT_EXIT_TIMEOUT, wait).await {
                    Ok(exit) if exit.exit_code != 0 => {
                        logger.debug(&format!(
                            "agent exited with code {} after reporting its result",
                            exit.exit_code
                        ));
                    }
                    Ok(_) => {}
                    Err(_) => {
                        logger.debug("agent still running after reporting its result");
                    }
                }
                Ok(result)
            }
            Err(TunnelError::ClosedWithoutResult) => {
                let exit = wait.await;
                Err(ClientError::RemoteCommand {
                    exit_code: Some(exit.exit_code),
                    stderr: String::from_utf8_lossy(&exit.stderr).trim().to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Current workspace status as reported by the agent on the machine.
    ///
    /// An agent that cannot be executed means the machine holds no
    /// workspace; that is a `NotFound` answer, not an error.
    ///
    /// # Errors
    /// Returns an error when the machine is unreachable or the agent
    /// prints a status no backend is expected to produce.
    pub async fn status(&self, options: &StatusOptions) -> Result<WorkspaceStatus, ClientError> {
        let path = shlex::try_quote(&self.agent.agent_path)?;
        let id = shlex::try_quote(&self.workspace.id)?;
        let mut command = format!("{path} agent workspace status --id {id}");
        if options.container_status {
            command.push_str(" --container-status");
        }

        let output = self.runner.run(&command, &[]).await?;
        if !output.success() {
            return Ok(WorkspaceStatus::NotFound);
        }
        Ok(output.stdout_text().parse()?)
    }

    /// Run a raw command on the machine.
    ///
    /// # Errors
    /// Returns an error when the command cannot be executed.
    pub async fn command(
        &self,
        command: &str,
        stdin: &[u8],
    ) -> Result<crate::runner::CommandOutput, ClientError> {
        self.runner.run(command, stdin).await
    }

    /// Probe the machine with a trivial command, retrying while it boots.
    async fn wait_until_reachable(
        &self,
        cancel: &CancellationToken,
        logger: &dyn Logger,
    ) -> Result<(), ClientError> {
        let deadline = tokio::time::Instant::now() + REACHABLE_TIMEOUT;
        loop {
            match self.runner.run("echo -n up", &[]).await {
                Ok(output) if output.success() => return Ok(()),
                Ok(output) => {
                    logger.debug(&format!(
                        "machine probe failed with code {}",
                        output.exit_code
                    ));
                }
                Err(err) => logger.debug(&format!("machine not reachable yet: {err}")),
            }

            if tokio::time::Instant::now() + REACHABLE_RETRY > deadline {
                return Err(ClientError::RemoteCommand {
                    exit_code: None,
                    stderr: format!(
                        "machine did not become reachable within {}s",
                        REACHABLE_TIMEOUT.as_secs()
                    ),
                });
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(ClientError::Canceled),
                () = tokio::time::sleep(REACHABLE_RETRY) => {}
            }
        }
    }
}

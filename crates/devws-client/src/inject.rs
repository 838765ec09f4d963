//! Remote agent injection.
//!
//! Before a session can run, the remote side needs a matching agent
//! binary. The injector probes the installed version, transfers the
//! binary at most once when it is missing or outdated, and starts the
//! agent with piped stdio for the tunnel.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::timeout;

use devws_core::log::Logger;
use devws_core::AgentInfo;

use crate::error::ClientError;
use crate::runner::{CommandRunner, RunningCommand};

/// Injects and starts the remote agent through a [`CommandRunner`].
pub struct AgentInjector {
    runner: Arc<dyn CommandRunner>,
    info: AgentInfo,
    expected_version: String,
    local_binary: Option<PathBuf>,
    transferred: bool,
}

impl AgentInjector {
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        info: AgentInfo,
        expected_version: impl Into<String>,
        local_binary: Option<PathBuf>,
    ) -> Self {
        Self {
            runner,
            info,
            expected_version: expected_version.into(),
            local_binary,
            transferred: false,
        }
    }

    /// Ensure a matching agent binary exists on the remote side.
    ///
    /// Probes `<agent> version` first and transfers the binary only on a
    /// missing or mismatched agent. The transfer happens at most once per
    /// injector; a second mismatch is reported as an error instead of
    /// looping.
    ///
    /// # Errors
    /// Returns `AgentInjectionTimeout` when the transfer exceeds the
    /// configured timeout and `RemoteCommand` when the agent still does
    /// not respond afterwards.
    pub async fn ensure_agent(&mut self, logger: &dyn Logger) -> Result<(), ClientError> {
        if self.info.local {
            logger.debug("agent runs locally, skipping injection");
            return Ok(());
        }

        if self.probe().await? {
            logger.debug("agent is up to date");
            return Ok(());
        }

        if self.transferred {
            return Err(ClientError::RemoteCommand {
                exit_code: None,
                stderr: format!(
                    "agent at {} does not respond after injection",
                    self.info.agent_path
                ),
            });
        }

        logger.info("Injecting agent...");
        let inject_timeout = self.info.inject_timeout();
        timeout(inject_timeout, self.transfer())
            .await
            .map_err(|_| ClientError::AgentInjectionTimeout {
                timeout: inject_timeout,
            })??;
        self.transferred = true;

        if self.probe().await? {
            Ok(())
        } else {
            Err(ClientError::RemoteCommand {
                exit_code: None,
                stderr: format!(
                    "agent at {} does not respond after injection",
                    self.info.agent_path
                ),
            })
        }
    }

    /// Start the agent's session entrypoint with piped stdio.
    ///
    /// # Errors
    /// Returns an error if the agent process cannot be spawned.
    pub async fn start_agent(
        &self,
        workspace_info: &str,
        debug: bool,
    ) -> Result<RunningCommand, ClientError> {
        let path = shlex::try_quote(&self.info.agent_path)?;
        let info = shlex::try_quote(workspace_info)?;
        let mut command = format!("{path} agent workspace up --workspace-info {info}");
        if debug {
            command.push_str(" --debug");
        }
        self.runner.spawn(&command).await
    }

    /// True when the installed agent responds with the expected version.
    async fn probe(&self) -> Result<bool, ClientError> {
        let path = shlex::try_quote(&self.info.agent_path)?;
        let output = self.runner.run(&format!("{path} version"), &[]).await?;
        Ok(output.success() && output.stdout_text() == self.expected_version)
    }

    async fn transfer(&self) -> Result<(), ClientError> {
        let path = shlex::try_quote(&self.info.agent_path)?.into_owned();
        let tmp = shlex::try_quote(&format!("{}.tmp", self.info.agent_path))?.into_owned();
        let dir = PathBuf::from(&self.info.agent_path)
            .parent()
            .map_or_else(|| ".".to_string(), |p| p.display().to_string());
        let dir = shlex::try_quote(&dir)?.into_owned();

        let (command, stdin) = if let Some(binary) = &self.local_binary {
            let data = tokio::fs::read(binary).await?;
            (
                format!("mkdir -p {dir} && cat > {tmp} && chmod +x {tmp} && mv {tmp} {path}"),
                data,
            )
        } else if let Some(url) = &self.info.agent_url {
            let url = shlex::try_quote(url)?;
            (
                format!(
                    "mkdir -p {dir} && curl -fsSL {url} -o {tmp} && chmod +x {tmp} && mv {tmp} {path}"
                ),
                Vec::new(),
            )
        } else {
            return Err(ClientError::RemoteCommand {
                exit_code: None,
                stderr: "no local agent binary and no download url configured".to_string(),
            });
        };

        let output = self.runner.run(&format!("sh -c {}", shlex::try_quote(&command)?), &stdin).await?;
        if output.success() {
            Ok(())
        } else {
            Err(ClientError::RemoteCommand {
                exit_code: Some(output.exit_code),
                stderr: output.stderr_text(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use devws_core::log::{LogLevel, TracingLogger};

    use super::*;
    use crate::runner::CommandOutput;

    /// Runner whose probe answers reflect what a transfer installed.
    struct FakeRunner {
        installs: String,
        installed: Mutex<Option<String>>,
        transfers: Mutex<u32>,
        transfer_succeeds: bool,
    }

    impl FakeRunner {
        fn new(installed: Option<&str>, transfer_succeeds: bool) -> Self {
            Self::installing(installed, "v0.3.0", transfer_succeeds)
        }

        fn installing(installed: Option<&str>, installs: &str, transfer_succeeds: bool) -> Self {
            Self {
                installs: installs.to_string(),
                installed: Mutex::new(installed.map(ToString::to_string)),
                transfers: Mutex::new(0),
                transfer_succeeds,
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, command: &str, _stdin: &[u8]) -> Result<CommandOutput, ClientError> {
            if command.ends_with(" version") {
                let installed = self.installed.lock().unwrap();
                return Ok(match installed.as_ref() {
                    Some(version) => CommandOutput {
                        exit_code: 0,
                        stdout: format!("{version}\n").into_bytes(),
                        stderr: Vec::new(),
                    },
                    None => CommandOutput {
                        exit_code: 127,
                        stdout: Vec::new(),
                        stderr: b"not found".to_vec(),
                    },
                });
            }

            *self.transfers.lock().unwrap() += 1;
            if self.transfer_succeeds {
                *self.installed.lock().unwrap() = Some(self.installs.clone());
                Ok(CommandOutput {
                    exit_code: 0,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                })
            } else {
                Ok(CommandOutput {
                    exit_code: 1,
                    stdout: Vec::new(),
                    stderr: b"disk full".to_vec(),
                })
            }
        }

        async fn spawn(&self, _command: &str) -> Result<RunningCommand, ClientError> {
            unimplemented!("not used by these tests")
        }
    }

    fn info_with_url() -> AgentInfo {
        AgentInfo {
            agent_url: Some("https://example.com/agent".to_string()),
            ..AgentInfo::default()
        }
    }

    #[tokio::test]
    async fn missing_agent_is_transferred_once() {
        let runner = Arc::new(FakeRunner::new(None, true));
        let mut injector =
            AgentInjector::new(runner.clone(), info_with_url(), "v0.3.0", None);

        injector
            .ensure_agent(&TracingLogger::new(LogLevel::Debug))
            .await
            .unwrap();
        assert_eq!(*runner.transfers.lock().unwrap(), 1);

        // a second call finds the agent in place and does not transfer again
        injector
            .ensure_agent(&TracingLogger::new(LogLevel::Debug))
            .await
            .unwrap();
        assert_eq!(*runner.transfers.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn outdated_agent_is_replaced() {
        let runner = Arc::new(FakeRunner::new(Some("v0.2.0"), true));
        let mut injector =
            AgentInjector::new(runner.clone(), info_with_url(), "v0.3.0", None);

        injector
            .ensure_agent(&TracingLogger::new(LogLevel::Debug))
            .await
            .unwrap();
        assert_eq!(*runner.transfers.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn matching_agent_skips_transfer() {
        let runner = Arc::new(FakeRunner::new(Some("v0.3.0"), true));
        let mut injector =
            AgentInjector::new(runner.clone(), info_with_url(), "v0.3.0", None);

        injector
            .ensure_agent(&TracingLogger::new(LogLevel::Debug))
            .await
            .unwrap();
        assert_eq!(*runner.transfers.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn mismatch_after_transfer_fails_without_retrying() {
        // transfer "succeeds" but installs the wrong version
        let runner = Arc::new(FakeRunner::installing(None, "v0.1.0", true));
        let mut injector =
            AgentInjector::new(runner.clone(), info_with_url(), "v0.3.0", None);

        let err = injector
            .ensure_agent(&TracingLogger::new(LogLevel::Debug))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::RemoteCommand {
                exit_code: None,
                ..
            }
        ));
        assert_eq!(*runner.transfers.lock().unwrap(), 1);

        // still only one transfer on a later attempt
        injector
            .ensure_agent(&TracingLogger::new(LogLevel::Debug))
            .await
            .unwrap_err();
        assert_eq!(*runner.transfers.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_transfer_surfaces_stderr() {
        let runner = Arc::new(FakeRunner::new(None, false));
        let mut injector = AgentInjector::new(runner, info_with_url(), "v0.3.0", None);

        let err = injector
            .ensure_agent(&TracingLogger::new(LogLevel::Debug))
            .await
            .unwrap_err();
        match err {
            ClientError::RemoteCommand { exit_code, stderr } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn local_agent_needs_no_injection() {
        let runner = Arc::new(FakeRunner::new(None, true));
        let info = AgentInfo {
            local: true,
            ..AgentInfo::default()
        };
        let mut injector = AgentInjector::new(runner.clone(), info, "v0.3.0", None);

        injector
            .ensure_agent(&TracingLogger::new(LogLevel::Debug))
            .await
            .unwrap();
        assert_eq!(*runner.transfers.lock().unwrap(), 0);
    }
}

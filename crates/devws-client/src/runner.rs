//! Command execution seam.
//!
//! Backends differ in how they reach the remote side (SSH subprocess, OS
//! pipes, sockets); `CommandRunner` hides that behind run/spawn so the
//! injector and tunnel code stay transport-agnostic.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use crate::error::ClientError;

/// Output of a command run to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Exit state of a streamed command.
#[derive(Debug, Clone)]
pub struct CommandExit {
    pub exit_code: i32,
    pub stderr: Vec<u8>,
}

/// A spawned command with piped stdio.
///
/// `stdin`/`stdout` form the raw duplex transport; `wait` resolves once the
/// process exits and yields the exit code plus captured stderr.
pub struct RunningCommand {
    stdin: Box<dyn AsyncWrite + Send + Unpin>,
    stdout: Box<dyn AsyncRead + Send + Unpin>,
    wait: BoxFuture<'static, CommandExit>,
}

impl RunningCommand {
    pub fn new(
        stdin: impl AsyncWrite + Send + Unpin + 'static,
        stdout: impl AsyncRead + Send + Unpin + 'static,
        wait: impl Future<Output = CommandExit> + Send + 'static,
    ) -> Self {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            wait: Box::pin(wait),
        }
    }

    /// Split into write half, read half and the exit future.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        Box<dyn AsyncWrite + Send + Unpin>,
        Box<dyn AsyncRead + Send + Unpin>,
        BoxFuture<'static, CommandExit>,
    ) {
        (self.stdin, self.stdout, self.wait)
    }
}

/// Runs commands on the workspace's execution target.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, feeding it `stdin` and capturing output.
    async fn run(&self, command: &str, stdin: &[u8]) -> Result<CommandOutput, ClientError>;

    /// Spawn a command with piped stdio for streaming use.
    async fn spawn(&self, command: &str) -> Result<RunningCommand, ClientError>;
}

/// Runner executing commands on a remote host through the local `ssh`
/// binary.
pub struct SshCommandRunner {
    ssh_path: PathBuf,
    target: String,
    extra_args: Vec<String>,
}

impl SshCommandRunner {
    /// Create a runner for `user@host`.
    ///
    /// # Errors
    /// Returns an error if no `ssh` binary is on the PATH.
    pub fn new(target: impl Into<String>) -> Result<Self, ClientError> {
        let ssh_path = which::which("ssh")
            .map_err(|_| ClientError::ExecutableNotFound("ssh".to_string()))?;
        Ok(Self {
            ssh_path,
            target: target.into(),
            extra_args: vec!["-oBatchMode=yes".to_string()],
        })
    }

    /// Add extra ssh arguments, e.g. a port or identity file.
    #[must_use]
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.ssh_path);
        cmd.args(&self.extra_args)
            .arg(&self.target)
            .arg(remote_command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandRunner for SshCommandRunner {
    async fn run(&self, command: &str, stdin: &[u8]) -> Result<CommandOutput, ClientError> {
        let mut child = self.command(command).spawn()?;

        if let Some(mut child_stdin) = child.stdin.take() {
            child_stdin.write_all(stdin).await?;
            child_stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn spawn(&self, command: &str) -> Result<RunningCommand, ClientError> {
        let mut child = self.command(command).spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let mut stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let wait = async move {
            let mut captured = Vec::new();
            let _ = stderr.read_to_end(&mut captured).await;
            let exit_code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(_) => -1,
            };
            CommandExit {
                exit_code,
                stderr: captured,
            }
        };

        Ok(RunningCommand::new(stdin, stdout, wait))
    }
}

fn missing_pipe(name: &str) -> std::io::Error {
    std::io::Error::other(format!("child process has no {name} pipe"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_helpers_trim() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: b"v0.3.1\n".to_vec(),
            stderr: b"  warning\n".to_vec(),
        };
        assert!(output.success());
        assert_eq!(output.stdout_text(), "v0.3.1");
        assert_eq!(output.stderr_text(), "warning");
    }
}

//! Tunnel server loop.
//!
//! Runs on the local side of the duplex transport, consuming agent
//! envelopes in arrival order until the terminal result. The local process
//! is the protocol server both for machine sessions (agent on the far end
//! of SSH stdio) and proxy sessions (provider subprocess on OS pipes).

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use devws_core::{Logger, SessionResult};

use crate::credentials::CredentialBroker;
use crate::envelope::{AgentMessage, CredentialScope, HostMessage};
use crate::framing::{self, ProtocolError};

/// Tunnel session error.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The transport closed before a terminal result arrived. The caller
    /// attaches any captured stderr as context.
    #[error("stream closed before a session result was received")]
    ClosedWithoutResult,
    #[error("session canceled")]
    Canceled,
}

/// Configuration for one up server run.
pub struct UpServerConfig {
    /// Workspace id, used for diagnostics only.
    pub workspace_id: String,
    /// Answer git credential requests.
    pub inject_git_credentials: bool,
    /// Answer docker credential requests.
    pub inject_docker_credentials: bool,
    /// Collaborator resolving allowed credential requests.
    pub broker: Arc<dyn CredentialBroker>,
}

impl UpServerConfig {
    fn allows(&self, scope: CredentialScope) -> bool {
        match scope {
            CredentialScope::Git => self.inject_git_credentials,
            CredentialScope::Docker => self.inject_docker_credentials,
        }
    }
}

/// Drive an up session to its terminal result.
///
/// Envelopes are processed strictly in arrival order: logs are handed to
/// `logger` immediately, credential requests are answered or refused, and
/// exactly one `Result` ends the session. Cancellation tears down the local
/// end only; the remote process is not guaranteed to be killed.
///
/// # Errors
/// Returns `Canceled` when the token fires, `ClosedWithoutResult` on EOF
/// before the terminal message, and a protocol error for malformed frames.
pub async fn run_up_server<R, W>(
    cancel: &CancellationToken,
    mut reader: R,
    mut writer: W,
    config: &UpServerConfig,
    logger: &dyn Logger,
) -> Result<SessionResult, TunnelError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => return Err(TunnelError::Canceled),
            msg = framing::read_message::<_, AgentMessage>(&mut reader) => msg?,
        };

        match msg {
            Some(AgentMessage::Log { message }) => {
                logger.log(message.level, &message.message);
            }
            Some(AgentMessage::CredentialRequest { id, scope, payload }) => {
                let reply = if config.allows(scope) {
                    match config.broker.resolve(scope, payload).await {
                        Ok(payload) => HostMessage::CredentialResponse { id, payload },
                        Err(err) => HostMessage::CredentialDenied {
                            id,
                            reason: err.to_string(),
                        },
                    }
                } else {
                    HostMessage::CredentialDenied {
                        id,
                        reason: format!("{scope:?} credential injection is disabled"),
                    }
                };
                framing::write_message(&mut writer, &reply).await?;
            }
            Some(AgentMessage::Result { result }) => {
                tracing::debug!(
                    workspace = %config.workspace_id,
                    "received session result, closing tunnel"
                );
                return Ok(result);
            }
            None => return Err(TunnelError::ClosedWithoutResult),
        }
    }
}

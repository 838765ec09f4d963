//! Local credential collaborator answering tunnel requests.

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::CredentialScope;

/// Resolves git/docker credential requests coming back through the tunnel.
///
/// Implemented outside this crate by whatever holds the local credential
/// helpers; the tunnel server only routes requests to it when the session
/// was started with the matching inject flag.
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// Resolve one request. An error is reported to the agent as a denial.
    async fn resolve(&self, scope: CredentialScope, payload: Value) -> anyhow::Result<Value>;
}

/// Broker that denies everything. Used when no credential helper is wired.
pub struct RefuseAllCredentials;

#[async_trait]
impl CredentialBroker for RefuseAllCredentials {
    async fn resolve(&self, scope: CredentialScope, _payload: Value) -> anyhow::Result<Value> {
        anyhow::bail!("credential forwarding for {scope:?} is not enabled")
    }
}

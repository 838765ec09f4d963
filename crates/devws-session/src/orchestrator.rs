//! The up state machine.
//!
//! One task drives a session through its states in order: resolve the
//! client, acquire the lock (skipped in platform mode), check provider
//! freshness, run the backend session, persist the result, release the
//! lock, fire post actions. The lock is released on every path, including
//! cancellation and backend failure.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use devws_client::{ClientError, WorkspaceClient};
use devws_core::log::Logger;
use devws_core::store::StoreError;
use devws_core::{SessionResult, UpOptions};
use devws_tunnel::CredentialBroker;

use crate::freshness::{ProviderUpdater, check_provider_freshness};
use crate::post::{PostActions, run_post_actions};

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No client could be resolved for the given options.
    #[error("couldn't resolve a workspace client: {0}")]
    Resolve(#[source] anyhow::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Maps up options to the one backend responsible for the workspace.
#[async_trait]
pub trait ClientResolver: Send + Sync {
    /// Resolve or create the workspace and return its client.
    async fn resolve(&self, options: &UpOptions) -> anyhow::Result<WorkspaceClient>;
}

/// Drives up sessions end to end.
pub struct SessionOrchestrator {
    resolver: Arc<dyn ClientResolver>,
    updater: Arc<dyn ProviderUpdater>,
    post_actions: Arc<dyn PostActions>,
    broker: Arc<dyn CredentialBroker>,
}

impl SessionOrchestrator {
    #[must_use]
    pub fn new(
        resolver: Arc<dyn ClientResolver>,
        updater: Arc<dyn ProviderUpdater>,
        post_actions: Arc<dyn PostActions>,
        broker: Arc<dyn CredentialBroker>,
    ) -> Self {
        Self {
            resolver,
            updater,
            post_actions,
            broker,
        }
    }

    /// Run one up session.
    ///
    /// The result is persisted before post actions run, so a post-action
    /// failure never loses an otherwise successful session. In platform
    /// mode the lock and the post actions are skipped; the driving
    /// platform owns both concerns.
    ///
    /// # Errors
    /// Returns an error when resolution, locking, the backend session or
    /// persisting fails. The lock is released in every case.
    pub async fn up(
        &self,
        options: &UpOptions,
        cancel: &CancellationToken,
        logger: &dyn Logger,
    ) -> Result<SessionResult, SessionError> {
        let client = self
            .resolver
            .resolve(options)
            .await
            .map_err(SessionError::Resolve)?;

        let platform = options.platform;
        if !platform {
            client.lock_wait(cancel).await?;
        }

        // everything after the lock funnels through here so the unlock
        // below runs on failure and cancellation too
        let outcome = self.run_session(&client, options, cancel, logger).await;

        if !platform {
            client.unlock();
        }
        let result = outcome?;

        if !platform {
            run_post_actions(
                self.post_actions.as_ref(),
                client.workspace(),
                &result,
                logger,
            )
            .await;
        }

        logger.done(&format!("Workspace {} is up", client.workspace().id));
        Ok(result)
    }

    async fn run_session(
        &self,
        client: &WorkspaceClient,
        options: &UpOptions,
        cancel: &CancellationToken,
        logger: &dyn Logger,
    ) -> Result<SessionResult, SessionError> {
        check_provider_freshness(self.updater.as_ref(), client.provider(), logger).await;

        let result = client
            .up(options, cancel, logger, self.broker.clone())
            .await?;

        client.store().save_result(client.workspace(), &result)?;
        Ok(result)
    }
}

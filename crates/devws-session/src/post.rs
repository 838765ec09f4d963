//! Post-action collaborators.
//!
//! SSH config, dotfiles and IDE launch all happen after the session result
//! is persisted. They are external concerns behind one trait; a failure is
//! logged and never rolls back the result.

use async_trait::async_trait;

use devws_core::log::Logger;
use devws_core::{SessionResult, WorkspaceConfig};

/// Actions run after a successful up session.
#[async_trait]
pub trait PostActions: Send + Sync {
    /// Write the workspace's SSH config entry.
    async fn configure_ssh(
        &self,
        workspace: &WorkspaceConfig,
        result: &SessionResult,
    ) -> anyhow::Result<()>;

    /// Install the user's dotfiles into the container.
    async fn install_dotfiles(
        &self,
        workspace: &WorkspaceConfig,
        result: &SessionResult,
    ) -> anyhow::Result<()>;

    /// Open the configured IDE against the workspace.
    async fn open_ide(
        &self,
        workspace: &WorkspaceConfig,
        result: &SessionResult,
    ) -> anyhow::Result<()>;
}

/// Post actions that do nothing, for headless and test use.
pub struct NoPostActions;

#[async_trait]
impl PostActions for NoPostActions {
    async fn configure_ssh(
        &self,
        _workspace: &WorkspaceConfig,
        _result: &SessionResult,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn install_dotfiles(
        &self,
        _workspace: &WorkspaceConfig,
        _result: &SessionResult,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn open_ide(
        &self,
        _workspace: &WorkspaceConfig,
        _result: &SessionResult,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Run all post actions in order, logging failures and continuing.
pub async fn run_post_actions(
    actions: &dyn PostActions,
    workspace: &WorkspaceConfig,
    result: &SessionResult,
    logger: &dyn Logger,
) {
    if let Err(err) = actions.configure_ssh(workspace, result).await {
        logger.warn(&format!("couldn't write ssh config: {err}"));
    }
    if let Err(err) = actions.install_dotfiles(workspace, result).await {
        logger.warn(&format!("couldn't install dotfiles: {err}"));
    }
    if let Err(err) = actions.open_ide(workspace, result).await {
        logger.warn(&format!("couldn't open {}: {err}", workspace.ide.name));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use devws_core::log::{LogLevel, TracingLogger};
    use devws_core::workspace::WorkspaceSource;

    use super::*;

    struct RecordingActions {
        calls: Mutex<Vec<&'static str>>,
        fail_dotfiles: bool,
    }

    #[async_trait]
    impl PostActions for RecordingActions {
        async fn configure_ssh(
            &self,
            _workspace: &WorkspaceConfig,
            _result: &SessionResult,
        ) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("ssh");
            Ok(())
        }

        async fn install_dotfiles(
            &self,
            _workspace: &WorkspaceConfig,
            _result: &SessionResult,
        ) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("dotfiles");
            if self.fail_dotfiles {
                anyhow::bail!("clone failed")
            }
            Ok(())
        }

        async fn open_ide(
            &self,
            _workspace: &WorkspaceConfig,
            _result: &SessionResult,
        ) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("ide");
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let actions = RecordingActions {
            calls: Mutex::new(Vec::new()),
            fail_dotfiles: true,
        };
        let workspace = WorkspaceConfig::new(
            "w1",
            "default",
            WorkspaceSource::LocalFolder {
                path: "/tmp/project".into(),
            },
        );

        run_post_actions(
            &actions,
            &workspace,
            &SessionResult::default(),
            &TracingLogger::new(LogLevel::Debug),
        )
        .await;

        assert_eq!(*actions.calls.lock().unwrap(), vec!["ssh", "dotfiles", "ide"]);
    }
}

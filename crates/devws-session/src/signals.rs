//! Signal-driven cancellation with double-signal escalation.
//!
//! The first interrupt cancels the session's token and lets the state
//! machine unwind gracefully. A second signal while cleanup is still
//! running forces an immediate hard exit. The escalation decision lives
//! in [`SignalPolicy::on_signal`] so it stays testable outside a signal
//! handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

/// What to do in response to one received signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: cancel and clean up.
    Cancel,
    /// Repeated signal: terminate immediately, skipping cleanup.
    HardExit,
}

/// Escalation policy shared between the signal task and the session.
pub struct SignalPolicy {
    cancel: CancellationToken,
    signals_seen: AtomicU32,
}

impl SignalPolicy {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            signals_seen: AtomicU32::new(0),
        }
    }

    /// Record one signal and decide the response.
    pub fn on_signal(&self) -> SignalAction {
        let seen = self.signals_seen.fetch_add(1, Ordering::SeqCst);
        if seen == 0 {
            self.cancel.cancel();
            SignalAction::Cancel
        } else {
            SignalAction::HardExit
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Spawn the task translating OS signals into this policy.
    ///
    /// Runs until the process exits; a hard exit terminates with status 1
    /// without unwinding.
    pub fn install(self: &Arc<Self>) {
        let policy = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if wait_for_signal().await.is_err() {
                    return;
                }
                match policy.on_signal() {
                    SignalAction::Cancel => {
                        tracing::info!("received interrupt, canceling session");
                    }
                    SignalAction::HardExit => {
                        tracing::warn!("received second interrupt, exiting immediately");
                        std::process::exit(1);
                    }
                }
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok(()),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_cancels_second_escalates() {
        let cancel = CancellationToken::new();
        let policy = SignalPolicy::new(cancel.clone());

        assert!(!cancel.is_cancelled());
        assert_eq!(policy.on_signal(), SignalAction::Cancel);
        assert!(cancel.is_cancelled());

        assert_eq!(policy.on_signal(), SignalAction::HardExit);
        assert_eq!(policy.on_signal(), SignalAction::HardExit);
    }
}

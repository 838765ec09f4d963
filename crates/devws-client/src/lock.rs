//! Per-workspace exclusive session lock.
//!
//! A lock file next to the workspace config guards all mutating operations
//! (up, rebuild, delete). The file records the holder's pid; a lock whose
//! holder is no longer alive is considered stale and reclaimed, so a
//! crashed process never wedges the workspace permanently.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use devws_core::WorkspaceStore;

use crate::error::ClientError;

const LOCK_FILE: &str = "workspace.lock";
const ACQUIRE_POLL: Duration = Duration::from_millis(250);

/// Lease used on platforms where holder liveness cannot be probed.
#[cfg(not(unix))]
const LOCK_LEASE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: i64,
}

/// Exclusive lock keyed by (context, workspace id).
#[derive(Debug, Clone)]
pub struct SessionLock {
    path: PathBuf,
    context: String,
    workspace: String,
}

impl SessionLock {
    #[must_use]
    pub fn new(store: &WorkspaceStore, context: &str, workspace: &str) -> Self {
        Self {
            path: store.workspace_dir(context, workspace).join(LOCK_FILE),
            context: context.to_string(),
            workspace: workspace.to_string(),
        }
    }

    /// Acquire the lock without blocking.
    ///
    /// # Errors
    /// Returns `LockContention` if another live holder owns the lock.
    pub fn acquire(&self) -> Result<LockGuard, ClientError> {
        match self.try_create() {
            Ok(guard) => Ok(guard),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if self.is_stale() {
                    tracing::debug!(
                        workspace = %self.workspace,
                        "reclaiming stale lock from dead holder"
                    );
                    let _ = fs::remove_file(&self.path);
                    self.try_create().map_err(|err| {
                        if err.kind() == io::ErrorKind::AlreadyExists {
                            self.contention()
                        } else {
                            ClientError::Io(err)
                        }
                    })
                } else {
                    Err(self.contention())
                }
            }
            Err(err) => Err(ClientError::Io(err)),
        }
    }

    /// Acquire the lock, polling until it becomes available or the token
    /// is canceled.
    ///
    /// # Errors
    /// Returns `Canceled` if the token fires first.
    pub async fn acquire_wait(&self, cancel: &CancellationToken) -> Result<LockGuard, ClientError> {
        loop {
            match self.acquire() {
                Ok(guard) => return Ok(guard),
                Err(ClientError::LockContention { .. }) => {
                    tokio::select! {
                        () = cancel.cancelled() => return Err(ClientError::Canceled),
                        () = tokio::time::sleep(ACQUIRE_POLL) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn contention(&self) -> ClientError {
        ClientError::LockContention {
            context: self.context.clone(),
            workspace: self.workspace.clone(),
        }
    }

    fn try_create(&self) -> io::Result<LockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: unix_now(),
        };
        file.write_all(&serde_json::to_vec(&info).unwrap_or_default())?;
        Ok(LockGuard {
            path: self.path.clone(),
            released: false,
        })
    }

    /// A lock is stale when its holder cannot be confirmed alive. An
    /// unreadable lock file counts as stale: there is no holder left to
    /// confirm.
    fn is_stale(&self) -> bool {
        let Ok(data) = fs::read(&self.path) else {
            return true;
        };
        match serde_json::from_slice::<LockInfo>(&data) {
            Ok(info) => !holder_alive(&info),
            Err(_) => true,
        }
    }
}

#[cfg(unix)]
fn holder_alive(info: &LockInfo) -> bool {
    let Ok(pid) = i32::try_from(info.pid) else {
        return false;
    };
    // signal 0 probes existence without delivering anything; EPERM still
    // means the process exists
    #[allow(unsafe_code)]
    let alive = unsafe { libc::kill(pid, 0) } == 0;
    alive || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn holder_alive(info: &LockInfo) -> bool {
    // no portable liveness probe; fall back to a lease
    let age = unix_now().saturating_sub(info.acquired_at);
    age >= 0 && Duration::from_secs(age.unsigned_abs()) < LOCK_LEASE
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Held lock. Dropping it releases the lock, so a deferred cleanup path
/// cannot leak it.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Release the lock. Idempotent; releasing twice is a no-op.
    pub fn unlock(&mut self) {
        if !self.released {
            self.released = true;
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.unlock();
    }
}

/// Lock plus held-guard slot shared by the client variants.
///
/// Not reentrant: a second acquire while the slot is occupied reports
/// contention, matching cross-process behavior.
#[derive(Debug)]
pub struct LockState {
    lock: SessionLock,
    guard: Mutex<Option<LockGuard>>,
}

impl LockState {
    #[must_use]
    pub fn new(lock: SessionLock) -> Self {
        Self {
            lock,
            guard: Mutex::new(None),
        }
    }

    /// Acquire and hold the lock.
    ///
    /// # Errors
    /// Returns `LockContention` if held, by this client or anyone else.
    pub fn acquire(&self) -> Result<(), ClientError> {
        let mut slot = self.guard.lock().expect("lock state poisoned");
        if slot.is_some() {
            return Err(self.lock.contention());
        }
        *slot = Some(self.lock.acquire()?);
        Ok(())
    }

    /// Acquire and hold the lock, waiting for availability.
    ///
    /// # Errors
    /// Returns `Canceled` if the token fires first.
    pub async fn acquire_wait(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        {
            let slot = self.guard.lock().expect("lock state poisoned");
            if slot.is_some() {
                return Err(self.lock.contention());
            }
        }
        let guard = self.lock.acquire_wait(cancel).await?;
        *self.guard.lock().expect("lock state poisoned") = Some(guard);
        Ok(())
    }

    /// Release the held lock. A no-op when nothing is held.
    pub fn release(&self) {
        if let Ok(mut slot) = self.guard.lock() {
            slot.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, WorkspaceStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn second_acquire_observes_contention_until_unlock() {
        let (_tmp, store) = store();
        let lock = SessionLock::new(&store, "default", "w1");

        let mut guard = lock.acquire().unwrap();
        assert!(matches!(
            lock.acquire(),
            Err(ClientError::LockContention { .. })
        ));

        guard.unlock();
        let _second = lock.acquire().unwrap();
    }

    #[test]
    fn unlock_is_idempotent() {
        let (_tmp, store) = store();
        let lock = SessionLock::new(&store, "default", "w1");

        let mut guard = lock.acquire().unwrap();
        guard.unlock();
        guard.unlock();
        let _second = lock.acquire().unwrap();
    }

    #[test]
    fn drop_releases_the_lock() {
        let (_tmp, store) = store();
        let lock = SessionLock::new(&store, "default", "w1");
        {
            let _guard = lock.acquire().unwrap();
        }
        let _second = lock.acquire().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn stale_lock_from_dead_holder_is_reclaimed() {
        let (_tmp, store) = store();
        let lock = SessionLock::new(&store, "default", "w1");

        let dir = store.workspace_dir("default", "w1");
        fs::create_dir_all(&dir).unwrap();
        let info = LockInfo {
            // beyond any realistic pid_max, guaranteed dead
            pid: 999_999_999,
            acquired_at: unix_now(),
        };
        fs::write(dir.join(LOCK_FILE), serde_json::to_vec(&info).unwrap()).unwrap();

        let _guard = lock.acquire().unwrap();
    }

    #[test]
    fn corrupt_lock_file_is_reclaimed() {
        let (_tmp, store) = store();
        let lock = SessionLock::new(&store, "default", "w1");

        let dir = store.workspace_dir("default", "w1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(LOCK_FILE), b"garbage").unwrap();

        let _guard = lock.acquire().unwrap();
    }

    #[test]
    fn lock_state_is_not_reentrant() {
        let (_tmp, store) = store();
        let state = LockState::new(SessionLock::new(&store, "default", "w1"));

        state.acquire().unwrap();
        assert!(matches!(
            state.acquire(),
            Err(ClientError::LockContention { .. })
        ));
        state.release();
        state.release(); // no-op
        state.acquire().unwrap();
    }

    #[tokio::test]
    async fn acquire_wait_respects_cancellation() {
        let (_tmp, store) = store();
        let lock = SessionLock::new(&store, "default", "w1");
        let _held = lock.acquire().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = lock.acquire_wait(&cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Canceled));
    }
}

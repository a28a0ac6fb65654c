// src/lock/resource_lock.rs

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::LockError;
use crate::lock::domain::LockDomain;
use crate::lock::probe::{Liveness, LivenessProbe, SignalProbe};
use crate::lock::record::{Action, LockStatus, format_record, next_action, parse_record};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// A system-wide lock backed by a PID file.
///
/// [`ResourceLock::acquire`] keeps polling until the record can be created
/// exclusively. Records left behind by dead processes are cleaned up on the
/// way. There is no timeout; use [`ResourceLock::acquire_with_cancel`] to be
/// able to give up.
#[derive(Debug, Clone)]
pub struct ResourceLock {
    path: PathBuf,
    poll_interval: Duration,
    probe: Arc<dyn LivenessProbe>,
}

impl ResourceLock {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            probe: Arc::new(SignalProbe),
        }
    }

    pub fn for_domain(domain: &LockDomain) -> Self {
        Self::at_path(domain.path())
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_probe(mut self, probe: impl LivenessProbe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until the lock is ours.
    pub async fn acquire(&self) -> Result<LockGuard, LockError> {
        self.acquire_inner(None).await
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`LockError::Cancelled`] once `cancel` fires.
    ///
    /// A dropped sender is not a cancellation; the wait just goes on.
    /// Giving up never touches a record held by someone else.
    pub async fn acquire_with_cancel(
        &self,
        cancel: oneshot::Receiver<()>,
    ) -> Result<LockGuard, LockError> {
        self.acquire_inner(Some(cancel)).await
    }

    /// Look at the current record without trying to take it.
    pub async fn status(&self) -> Result<LockStatus, LockError> {
        let body = match fs::read_to_string(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LockStatus::Free),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => return Ok(LockStatus::Corrupt),
            Err(source) => {
                return Err(LockError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let Some(pid) = parse_record(&body) else {
            return Ok(LockStatus::Corrupt);
        };

        match self.probe.probe(pid) {
            Ok(Liveness::Alive) => Ok(LockStatus::Held(pid)),
            Ok(Liveness::Dead) => Ok(LockStatus::Abandoned(pid)),
            Err(source) => Err(LockError::Probe { pid, source }),
        }
    }

    async fn acquire_inner(
        &self,
        mut cancel: Option<oneshot::Receiver<()>>,
    ) -> Result<LockGuard, LockError> {
        let mut attempt: u64 = 0;

        loop {
            if let Some(guard) = self.try_create().await? {
                return Ok(guard);
            }

            let status = self.status().await?;
            match next_action(status, attempt == 0) {
                Action::RetryNow => continue,
                Action::RemoveAndRetry => {
                    debug!(path = %self.path.display(), "removing corrupt lock file");
                    remove_lock_file(&self.path).await;
                    continue;
                }
                Action::RemoveStaleAndWait => {
                    debug!(path = %self.path.display(), ?status, "removing stale lock file");
                    remove_lock_file(&self.path).await;
                }
                Action::Wait => {}
            }

            if attempt == 0 {
                info!(path = %self.path.display(), ?status, "waiting for lock to be released...");
            }
            attempt += 1;

            if !self.pause(&mut cancel).await {
                debug!(path = %self.path.display(), attempt, "lock wait cancelled");
                return Err(LockError::Cancelled(self.path.clone()));
            }
        }
    }

    /// Exclusive create; `None` if someone else's record is in the way.
    ///
    /// The PID is written to a private staging file first and then hard-linked
    /// into place, so the record appears with its full body or not at all.
    async fn try_create(&self) -> Result<Option<LockGuard>, LockError> {
        let pid = std::process::id();
        let staged = self.staging_path(pid);

        if let Err(source) = write_staged(&staged, pid).await {
            remove_staged(&staged).await;
            return Err(LockError::Io {
                path: staged,
                source,
            });
        }

        let linked = fs::hard_link(&staged, &self.path).await;
        remove_staged(&staged).await;

        match linked {
            Ok(()) => {
                debug!(path = %self.path.display(), pid, "lock acquired");
                Ok(Some(LockGuard::new(self.path.clone())))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// `<dir>/<name>.<pid>.<seq>.tmp`, unique per attempt within the process.
    fn staging_path(&self, pid: u32) -> PathBuf {
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(format!(".{pid}.{seq}.tmp"));
        self.path.with_file_name(name)
    }

    /// Sleep one poll interval. Returns `false` if the caller cancelled.
    async fn pause(&self, cancel: &mut Option<oneshot::Receiver<()>>) -> bool {
        let Some(rx) = cancel.as_mut() else {
            sleep(self.poll_interval).await;
            return true;
        };

        let cancelled = tokio::select! {
            _ = sleep(self.poll_interval) => return true,
            res = rx => res.is_ok(),
        };

        if cancelled {
            return false;
        }

        // Sender went away without cancelling: keep waiting, uncancellable.
        *cancel = None;
        true
    }
}

/// Proof of holding a [`ResourceLock`].
///
/// Call [`release`](Self::release) when done. A guard that is dropped instead
/// removes the record synchronously.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the record. Never fails; problems are logged.
    pub async fn release(mut self) {
        self.released = true;
        remove_lock_file(&self.path).await;
        debug!(path = %self.path.display(), "lock released");
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

async fn write_staged(path: &Path, pid: u32) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(format_record(pid).as_bytes()).await?;
    file.flush().await
}

async fn remove_staged(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staging file"),
    }
}

async fn remove_lock_file(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove lock file");
    }
}

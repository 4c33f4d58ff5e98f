//! Advisory file lock shared with other bus users
//!
//! Other programs on the host talk to devices on the same adapter. They all
//! take an exclusive `flock` on one agreed lock file around each transfer,
//! so frames from different processes never interleave on the wire.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use riberry_hal::{BusLock, LockError};
use tracing::{trace, warn};

/// Default interval between lock attempts while contended
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Named cross-process lock backed by a lock file
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileLock {
    /// Lock on `path`; the file is created on first use
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the retry interval while another holder owns the lock
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File, LockError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|err| {
                warn!(path = %self.path.display(), %err, "cannot open lock file");
                LockError::Unavailable
            })
    }
}

impl BusLock for FileLock {
    type Guard<'a> = FileLockGuard;

    fn acquire(&self, timeout: Duration) -> Result<FileLockGuard, LockError> {
        let file = self.open()?;
        let deadline = Instant::now() + timeout;

        loop {
            match file.try_lock() {
                Ok(()) => {
                    trace!(path = %self.path.display(), "bus lock acquired");
                    return Ok(FileLockGuard { file });
                }
                Err(TryLockError::WouldBlock) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LockError::Timeout);
                    }
                    thread::sleep(self.poll_interval.min(deadline - now));
                }
                Err(TryLockError::Error(err)) => {
                    warn!(path = %self.path.display(), %err, "lock file cannot be locked");
                    return Err(LockError::Unavailable);
                }
            }
        }
    }
}

/// Held lock; released on drop
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        // Closing the descriptor would release it too
        if let Err(err) = self.file.unlock() {
            warn!(%err, "failed to release bus lock");
        }
    }
}

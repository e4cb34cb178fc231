// Cross-process mutex over the cache directory: an advisory flock on a
// fixed path, taken through async-fd-lock. Reentrant within one CacheMutex
// value via a holder counter.

use std::path::PathBuf;

use async_fd_lock::{LockWrite, RwLockWriteGuard};
use tokio::fs::File;

use crate::error::OffloadError;

pub struct CacheMutex {
    lock_path: PathBuf,
    held: u32,
    guard: Option<RwLockWriteGuard<File>>,
}

impl CacheMutex {
    pub fn new(lock_path: PathBuf) -> Self {
        CacheMutex {
            lock_path,
            held: 0,
            guard: None,
        }
    }

    // Takes the underlying file lock only on the 0 to 1 transition.
    pub async fn acquire(&mut self) -> Result<(), OffloadError> {
        if self.held == 0 {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .read(true)
                .open(&self.lock_path)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, path = ?self.lock_path, "failed to open cache mutex lock file");
                    OffloadError::ServiceUnavailable("cache mutex unavailable")
                })?;

            let guard = file.lock_write().await.map_err(|e| {
                tracing::error!(error = %e.error, "failed to acquire cache mutex");
                OffloadError::ServiceUnavailable("cache mutex unavailable")
            })?;

            self.guard = Some(guard);
        }
        self.held += 1;
        Ok(())
    }

    // Releasing an unheld mutex is a no-op, not an error: it can happen on
    // a cleanup path that runs after a failed acquire.
    pub fn release(&mut self) {
        if self.held == 0 {
            return;
        }
        self.held -= 1;
        if self.held == 0 {
            self.guard = None;
        }
    }
}

impl Drop for CacheMutex {
    fn drop(&mut self) {
        // Any residual hold is released implicitly: dropping `guard`
        // releases the flock.
    }
}

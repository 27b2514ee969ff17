// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-wide lock serializing hook execution across agents.
//!
//! Each lock name maps to a file under a shared directory; ownership is an
//! exclusive `flock` on that file, so the lock works across processes and
//! is released by the kernel if the holder dies.

use fs2::FileExt;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_LOCK_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {0} acquisition cancelled")]
    Cancelled(String),
    #[error("lock {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct HookLock {
    dir: PathBuf,
    delay: Duration,
}

/// Exclusive ownership of a named lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    file: File,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.name, error = %e, "failed to release lock");
        } else {
            tracing::debug!(lock = %self.name, "released lock");
        }
    }
}

fn contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl HookLock {
    pub fn new(dir: impl Into<PathBuf>, delay: Duration) -> Self {
        Self { dir: dir.into(), delay }
    }

    /// Acquire `name`, retrying every `delay` until it is free or `cancel`
    /// fires.
    pub async fn acquire(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<LockGuard, LockError> {
        let io = |source| LockError::Io { name: name.to_string(), source };
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled(name.to_string()));
        }
        std::fs::create_dir_all(&self.dir).map_err(io)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.dir.join(format!("{name}.lock")))
            .map_err(io)?;

        let mut waited = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(lock = name, waited, "acquired lock");
                    return Ok(LockGuard { name: name.to_string(), file });
                }
                Err(e) if contended(&e) => {}
                Err(e) => return Err(io(e)),
            }
            if !waited {
                tracing::info!(lock = name, "waiting for lock");
                waited = true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(LockError::Cancelled(name.to_string())),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "hooklock_tests.rs"]
mod tests;

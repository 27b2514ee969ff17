// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed bundle cache.
//!
//! Verified archives live directly under the cache directory, named after
//! the bundle URL and its SHA-256. Downloads are written to `downloads/`
//! first and only renamed into place once the hash checks out, so a file at
//! a canonical path is always complete and verified.

use futures_util::StreamExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use ua_adapters::{ArchiveSource, SourceError};
use ua_core::{BundleInfo, BundleUrl};

const DOWNLOADS_DIR: &str = "downloads";

/// Why a single download attempt gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadCause {
    #[error("expected sha256 \"{expected}\", got \"{actual}\"")]
    Mismatch { expected: String, actual: String },
    #[error("aborted")]
    Aborted,
    #[error("no download locations")]
    NoCandidates,
    #[error(transparent)]
    Source(SourceError),
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to download bundle \"{url}\" from {candidates:?}: {cause}")]
pub struct BundleError {
    pub url: BundleUrl,
    pub candidates: Vec<String>,
    pub cause: DownloadCause,
}

impl BundleError {
    pub fn is_aborted(&self) -> bool {
        self.cause == DownloadCause::Aborted
    }
}

/// A verified archive in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBundle {
    pub url: BundleUrl,
    pub sha256: String,
    pub path: PathBuf,
}

struct CacheInner<S> {
    dir: PathBuf,
    source: S,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Downloads, verifies and keeps bundle archives.
///
/// Clones share the same in-flight table, so concurrent fetches of one
/// bundle through any clone hit the network once.
pub struct BundleCache<S> {
    inner: Arc<CacheInner<S>>,
}

impl<S> Clone for BundleCache<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

/// Remove leftover partial downloads under a cache directory.
///
/// Safe on a fresh, partially populated or missing directory.
pub fn clear_downloads(cache_dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(cache_dir.join(DOWNLOADS_DIR)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

impl<S: ArchiveSource> BundleCache<S> {
    pub fn new(dir: impl Into<PathBuf>, source: S) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                dir: dir.into(),
                source,
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.inner.dir.join(DOWNLOADS_DIR)
    }

    pub fn clear_downloads(&self) -> std::io::Result<()> {
        clear_downloads(&self.inner.dir)
    }

    /// Canonical path of a verified copy of `info`
    pub fn path_for(&self, info: &BundleInfo) -> PathBuf {
        self.inner.dir.join(format!("{}-{}", info.url.cache_name(), info.sha256))
    }

    /// Return a verified local copy of `info`, downloading it if needed.
    pub async fn fetch(
        &self,
        info: &BundleInfo,
        cancel: &CancellationToken,
    ) -> Result<LocalBundle, BundleError> {
        let fail = |cause| BundleError {
            url: info.url.clone(),
            candidates: info.archive_urls.clone(),
            cause,
        };
        let canonical = self.path_for(info);
        let key = canonical.display().to_string();

        let slot = Arc::clone(self.inner.inflight.lock().entry(key.clone()).or_default());
        let result = tokio::select! {
            guard = slot.lock() => {
                let result = self.fetch_locked(info, &canonical, cancel).await;
                drop(guard);
                result
            }
            _ = cancel.cancelled() => Err(DownloadCause::Aborted),
        };
        {
            let mut inflight = self.inner.inflight.lock();
            // Only the table and this call hold the slot: nobody is waiting
            if Arc::strong_count(&slot) <= 2 {
                inflight.remove(&key);
            }
        }
        result.map_err(fail)
    }

    async fn fetch_locked(
        &self,
        info: &BundleInfo,
        canonical: &Path,
        cancel: &CancellationToken,
    ) -> Result<LocalBundle, DownloadCause> {
        let found = LocalBundle {
            url: info.url.clone(),
            sha256: info.sha256.clone(),
            path: canonical.to_path_buf(),
        };
        if canonical.is_file() {
            tracing::debug!(url = %info.url, "bundle already cached");
            return Ok(found);
        }
        if info.archive_urls.is_empty() {
            return Err(DownloadCause::NoCandidates);
        }

        let staging_dir = self.downloads_dir();
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .map_err(|e| DownloadCause::Io(e.to_string()))?;
        let staging = staging_dir.join(format!("{}-{}", info.url.cache_name(), nanoid::nanoid!(8)));

        let mut last = DownloadCause::NoCandidates;
        for candidate in &info.archive_urls {
            let attempt = self.download(candidate, &staging, cancel).await;
            match attempt {
                Ok(actual) if actual == info.sha256 => {
                    tokio::fs::rename(&staging, canonical)
                        .await
                        .map_err(|e| DownloadCause::Io(e.to_string()))?;
                    tracing::info!(url = %info.url, source = %candidate, "bundle downloaded");
                    return Ok(found);
                }
                Ok(actual) => {
                    let _ = tokio::fs::remove_file(&staging).await;
                    return Err(DownloadCause::Mismatch { expected: info.sha256.clone(), actual });
                }
                Err(DownloadCause::Aborted) => {
                    let _ = tokio::fs::remove_file(&staging).await;
                    return Err(DownloadCause::Aborted);
                }
                Err(cause) => {
                    let _ = tokio::fs::remove_file(&staging).await;
                    tracing::warn!(url = %info.url, source = %candidate, %cause, "download failed");
                    last = cause;
                }
            }
        }
        Err(last)
    }

    /// Stream one candidate into `staging`, returning the hex SHA-256.
    async fn download(
        &self,
        url: &str,
        staging: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, DownloadCause> {
        let mut body = tokio::select! {
            opened = self.inner.source.open(url) => opened.map_err(DownloadCause::Source)?,
            _ = cancel.cancelled() => return Err(DownloadCause::Aborted),
        };
        let io = |e: std::io::Error| DownloadCause::Io(e.to_string());
        let mut file = tokio::fs::File::create(staging).await.map_err(io)?;
        let mut hasher = Sha256::new();
        loop {
            let chunk = tokio::select! {
                chunk = body.next() => chunk,
                _ = cancel.cancelled() => return Err(DownloadCause::Aborted),
            };
            match chunk {
                Some(Ok(bytes)) => {
                    hasher.update(&bytes);
                    file.write_all(&bytes).await.map_err(io)?;
                }
                Some(Err(e)) => return Err(DownloadCause::Source(e)),
                None => break,
            }
        }
        file.sync_all().await.map_err(io)?;
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
#[path = "bundles_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unpacks a verified bundle into the unit's charm directory.

use crate::bundles::LocalBundle;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use ua_core::BundleUrl;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    /// The new contents could not replace the deployed ones
    #[error("cannot deploy {url}: {reason}")]
    Conflict { url: BundleUrl, reason: String },
    #[error("bad archive for {url}: {reason}")]
    Archive { url: BundleUrl, reason: String },
    #[error("deploy task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait Deployer: Clone + Send + Sync + 'static {
    async fn deploy(&self, bundle: &LocalBundle) -> Result<(), DeployError>;
}

/// Extracts gzipped tar bundles and swaps them into place.
///
/// The archive is unpacked beside the charm directory first; the old
/// contents move aside, the new ones move in, then the old ones are deleted.
#[derive(Debug, Clone)]
pub struct ArchiveDeployer {
    charm_dir: PathBuf,
    work_dir: PathBuf,
}

impl ArchiveDeployer {
    pub fn new(charm_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self { charm_dir: charm_dir.into(), work_dir: work_dir.into() }
    }
}

fn unpack(archive: &Path, into: &Path) -> std::io::Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    tar.unpack(into)
}

fn swap(staged: &Path, charm_dir: &Path, aside: &Path) -> std::io::Result<()> {
    if let Some(parent) = charm_dir.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let had_old = charm_dir.exists();
    if had_old {
        std::fs::rename(charm_dir, aside)?;
    }
    if let Err(e) = std::fs::rename(staged, charm_dir) {
        if had_old {
            let _ = std::fs::rename(aside, charm_dir);
        }
        return Err(e);
    }
    if had_old {
        let _ = std::fs::remove_dir_all(aside);
    }
    Ok(())
}

#[async_trait]
impl Deployer for ArchiveDeployer {
    async fn deploy(&self, bundle: &LocalBundle) -> Result<(), DeployError> {
        let bundle = bundle.clone();
        let charm_dir = self.charm_dir.clone();
        let work_dir = self.work_dir.clone();
        tokio::task::spawn_blocking(move || {
            let id = nanoid::nanoid!(8);
            let staged = work_dir.join(format!("staged-{id}"));
            let aside = work_dir.join(format!("old-{id}"));
            let archive_err =
                |e: std::io::Error| DeployError::Archive { url: bundle.url.clone(), reason: e.to_string() };

            std::fs::create_dir_all(&staged).map_err(archive_err)?;
            if let Err(e) = unpack(&bundle.path, &staged) {
                let _ = std::fs::remove_dir_all(&staged);
                return Err(archive_err(e));
            }
            if let Err(e) = swap(&staged, &charm_dir, &aside) {
                let _ = std::fs::remove_dir_all(&staged);
                return Err(DeployError::Conflict { url: bundle.url.clone(), reason: e.to_string() });
            }
            tracing::info!(url = %bundle.url, dir = %charm_dir.display(), "bundle deployed");
            Ok(())
        })
        .await
        .map_err(|e| DeployError::Task(e.to_string()))?
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{DeployError, Deployer};
    use crate::bundles::LocalBundle;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use ua_core::BundleUrl;

    #[derive(Default)]
    struct FakeDeployerState {
        deployed: Vec<BundleUrl>,
        conflicts: usize,
    }

    /// Deployer that records bundles and conflicts on request
    #[derive(Clone, Default)]
    pub struct FakeDeployer {
        inner: Arc<Mutex<FakeDeployerState>>,
    }

    impl FakeDeployer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `n` deploys with a conflict
        pub fn conflict_next(&self, n: usize) {
            self.inner.lock().conflicts = n;
        }

        pub fn deployed(&self) -> Vec<BundleUrl> {
            self.inner.lock().deployed.clone()
        }
    }

    #[async_trait]
    impl Deployer for FakeDeployer {
        async fn deploy(&self, bundle: &LocalBundle) -> Result<(), DeployError> {
            let mut s = self.inner.lock();
            if s.conflicts > 0 {
                s.conflicts -= 1;
                return Err(DeployError::Conflict {
                    url: bundle.url.clone(),
                    reason: "conflicting local changes".into(),
                });
            }
            s.deployed.push(bundle.url.clone());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDeployer;

#[cfg(test)]
#[path = "deployer_tests.rs"]
mod tests;

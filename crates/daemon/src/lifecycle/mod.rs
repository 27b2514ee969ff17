// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: paths, startup, shutdown.

mod startup;
pub use startup::startup;

use std::fs::File;
use std::path::PathBuf;

use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};
use ua_engine::AgentPaths;

use crate::config::{ConfigError, Settings};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Persisted operation state
    pub state_file: PathBuf,
    /// One file per joined relation
    pub relations_dir: PathBuf,
    /// Bundle cache, with its `downloads/` staging area
    pub bundles_dir: PathBuf,
    /// Scratch space for bundle swaps
    pub deployer_dir: PathBuf,
    /// Where the deployed bundle lives and hooks are run from
    pub charm_dir: PathBuf,
    /// Created by a hook to ask for a reboot
    pub reboot_flag: PathBuf,
    /// Status reports written by the local model
    pub status_path: PathBuf,
}

impl Config {
    /// Load settings and derive every on-disk path from the data directory.
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::from_settings(Settings::load()?))
    }

    pub fn from_settings(settings: Settings) -> Self {
        let dir = &settings.data_dir;
        let state = dir.join("state");
        Self {
            socket_path: dir.join("run.sock"),
            lock_path: dir.join("unitd.pid"),
            log_path: dir.join("unitd.log"),
            state_file: state.join("operation.json"),
            relations_dir: state.join("relations"),
            bundles_dir: state.join("bundles"),
            deployer_dir: state.join("deployer"),
            reboot_flag: state.join("reboot-requested"),
            charm_dir: dir.join("charm"),
            status_path: settings.model_path.with_extension("status.json"),
            settings,
        }
    }

    pub fn agent_paths(&self) -> AgentPaths {
        AgentPaths {
            state_file: self.state_file.clone(),
            relations_dir: self.relations_dir.clone(),
            bundles_dir: self.bundles_dir.clone(),
            lock_dir: self.settings.lock_dir.clone(),
            charm_dir: self.charm_dir.clone(),
            reboot_flag: self.reboot_flag.clone(),
        }
    }
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

/// Result of daemon startup
pub struct StartupResult {
    pub daemon: DaemonState,
    /// The Unix socket listener to spawn as a task
    pub listener: UnixListener,
}

impl DaemonState {
    /// Remove the socket and PID files. The lock is released on drop.
    pub fn shutdown(self) {
        info!("Shutting down daemon...");
        for path in [&self.config.socket_path, &self.config.lock_path] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
        info!("Daemon shutdown complete");
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
pub(crate) mod test_helpers;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

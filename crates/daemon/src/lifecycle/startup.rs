// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use fs2::FileExt;
use tokio::net::UnixListener;
use tracing::info;

use super::{Config, DaemonState, LifecycleError, StartupResult};

/// Start the daemon
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // A failed lock means another daemon owns these files;
            // leave them alone.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create data directory (needed for socket, lock, etc.)
    std::fs::create_dir_all(&config.settings.data_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    // Open without truncating so a running daemon's PID survives.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Create directories
    for dir in [
        &config.relations_dir,
        &config.bundles_dir,
        &config.deployer_dir,
        &config.charm_dir,
        &config.settings.lock_dir,
    ] {
        std::fs::create_dir_all(dir)?;
    }
    if let Some(parent) = config.state_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 4. Partial downloads from a previous run are never resumed
    ua_engine::clear_downloads(&config.bundles_dir)?;

    // 5. Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;
    std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o777))?;

    info!(
        unit = %config.settings.unit,
        socket = %config.socket_path.display(),
        "daemon started"
    );

    Ok(StartupResult {
        daemon: DaemonState { config: config.clone(), lock_file },
        listener,
    })
}

fn cleanup_on_failure(config: &Config) {
    let _ = std::fs::remove_file(&config.socket_path);
    let _ = std::fs::remove_file(&config.lock_path);
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Each accessor returns `None` when the variable is unset or unparsable so
//! the config file and built-in defaults can fill the gap.

use std::path::PathBuf;
use std::time::Duration;

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH"));

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn millis(name: &str) -> Option<Duration> {
    var(name).and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// Root data directory (`UNITD_DATA_DIR`)
pub fn data_dir() -> Option<PathBuf> {
    var("UNITD_DATA_DIR").map(PathBuf::from)
}

/// Fallback data directory: XDG_STATE_HOME/unitd > ~/.local/state/unitd
pub fn default_data_dir() -> Option<PathBuf> {
    if let Some(xdg) = var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("unitd"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/unitd"))
}

/// Unit this agent runs (`UNITD_UNIT`)
pub fn unit() -> Option<String> {
    var("UNITD_UNIT")
}

/// Model file backing the control plane (`UNITD_MODEL`)
pub fn model_path() -> Option<PathBuf> {
    var("UNITD_MODEL").map(PathBuf::from)
}

/// Model file poll interval (`UNITD_MODEL_POLL_MS`)
pub fn model_poll() -> Option<Duration> {
    millis("UNITD_MODEL_POLL_MS")
}

/// Name of the host-wide hook lock (`UNITD_LOCK_NAME`)
pub fn lock_name() -> Option<String> {
    var("UNITD_LOCK_NAME")
}

/// Retry delay while the hook lock is held elsewhere (`UNITD_LOCK_DELAY_MS`)
pub fn lock_delay() -> Option<Duration> {
    millis("UNITD_LOCK_DELAY_MS")
}

/// Directory shared by every agent on the host for hook locks (`UNITD_LOCK_DIR`)
pub fn lock_dir() -> Option<PathBuf> {
    var("UNITD_LOCK_DIR").map(PathBuf::from)
}

/// Period of the update-status hook (`UNITD_UPDATE_STATUS_SECS`)
pub fn update_status_period() -> Option<Duration> {
    var("UNITD_UPDATE_STATUS_SECS").and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs)
}

/// Period of the collect-metrics hook (`UNITD_COLLECT_METRICS_SECS`)
pub fn collect_metrics_period() -> Option<Duration> {
    var("UNITD_COLLECT_METRICS_SECS").and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs)
}

/// Socket read/write timeout (`UNITD_IPC_TIMEOUT_MS`)
pub fn ipc_timeout() -> Option<Duration> {
    millis("UNITD_IPC_TIMEOUT_MS")
}

/// Optional TOML config file (`UNITD_CONFIG`)
pub fn config_path() -> Option<PathBuf> {
    var("UNITD_CONFIG").map(PathBuf::from)
}

/// Log filter directive: `UNITD_LOG` > `RUST_LOG`
pub fn log_filter() -> Option<String> {
    var("UNITD_LOG").or_else(|| var("RUST_LOG"))
}

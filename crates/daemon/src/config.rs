// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon settings: environment over the optional TOML file over defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use ua_core::{UnitName, UnitNameError};
use ua_engine::{DEFAULT_COLLECT_METRICS_PERIOD, DEFAULT_LOCK_DELAY, DEFAULT_UPDATE_STATUS_PERIOD};

use crate::env;

const DEFAULT_LOCK_NAME: &str = "machine-lock";
const DEFAULT_LOCK_DIR: &str = "/tmp/unitd-locks";
const DEFAULT_IPC_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MODEL_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no unit configured (set UNITD_UNIT or `unit` in the config file)")]
    MissingUnit,
    #[error(transparent)]
    InvalidUnit(#[from] UnitNameError),
    #[error("could not determine data directory")]
    NoDataDir,
}

/// Contents of the optional config file. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub unit: Option<String>,
    pub model: Option<PathBuf>,
    pub model_poll_ms: Option<u64>,
    pub lock_name: Option<String>,
    pub lock_delay_ms: Option<u64>,
    pub lock_dir: Option<PathBuf>,
    pub update_status_secs: Option<u64>,
    pub collect_metrics_secs: Option<u64>,
    pub ipc_timeout_ms: Option<u64>,
    /// Extra environment for hooks and commands
    pub hook_env: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
    }
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub unit: UnitName,
    pub model_path: PathBuf,
    pub model_poll: Duration,
    pub lock_name: String,
    pub lock_delay: Duration,
    pub lock_dir: PathBuf,
    pub update_status_period: Duration,
    pub collect_metrics_period: Duration,
    pub ipc_timeout: Duration,
    pub hook_env: BTreeMap<String, String>,
}

impl Settings {
    /// Read `UNITD_CONFIG` (if set) and layer the environment on top.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match env::config_path() {
            Some(path) => FileConfig::read(&path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file)
    }

    pub fn resolve(file: FileConfig) -> Result<Self, ConfigError> {
        let data_dir = env::data_dir()
            .or(file.data_dir)
            .or_else(env::default_data_dir)
            .ok_or(ConfigError::NoDataDir)?;
        let unit: UnitName = env::unit().or(file.unit).ok_or(ConfigError::MissingUnit)?.parse()?;
        let model_path =
            env::model_path().or(file.model).unwrap_or_else(|| data_dir.join("model.json"));

        Ok(Self {
            unit,
            model_path,
            model_poll: env::model_poll()
                .or(file.model_poll_ms.map(Duration::from_millis))
                .unwrap_or(DEFAULT_MODEL_POLL),
            lock_name: env::lock_name()
                .or(file.lock_name)
                .unwrap_or_else(|| DEFAULT_LOCK_NAME.to_string()),
            lock_delay: env::lock_delay()
                .or(file.lock_delay_ms.map(Duration::from_millis))
                .unwrap_or(DEFAULT_LOCK_DELAY),
            lock_dir: env::lock_dir()
                .or(file.lock_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_DIR)),
            update_status_period: env::update_status_period()
                .or(file.update_status_secs.map(Duration::from_secs))
                .unwrap_or(DEFAULT_UPDATE_STATUS_PERIOD),
            collect_metrics_period: env::collect_metrics_period()
                .or(file.collect_metrics_secs.map(Duration::from_secs))
                .unwrap_or(DEFAULT_COLLECT_METRICS_PERIOD),
            ipc_timeout: env::ipc_timeout()
                .or(file.ipc_timeout_ms.map(Duration::from_millis))
                .unwrap_or(DEFAULT_IPC_TIMEOUT),
            hook_env: file.hook_env,
            data_dir,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

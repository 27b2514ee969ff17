// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub(crate) use tempfile::tempdir;

use super::Config;
use crate::config::Settings;

pub(crate) fn test_settings(dir: &Path) -> Settings {
    Settings {
        data_dir: dir.join("data"),
        unit: "wordpress/0".parse().unwrap(),
        model_path: dir.join("model.json"),
        model_poll: Duration::from_millis(20),
        lock_name: "machine-lock".into(),
        lock_delay: Duration::from_millis(10),
        lock_dir: dir.join("locks"),
        update_status_period: Duration::from_secs(300),
        collect_metrics_period: Duration::from_secs(300),
        ipc_timeout: Duration::from_secs(2),
        hook_env: BTreeMap::new(),
    }
}

pub(crate) fn test_config(dir: &Path) -> Config {
    Config::from_settings(test_settings(dir))
}

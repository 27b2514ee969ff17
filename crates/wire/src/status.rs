// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status snapshot served over the socket.

use serde::{Deserialize, Serialize};
use ua_core::{BundleUrl, HookInfo, UnitName};

/// What the agent is doing right now
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitStatus {
    pub unit: UnitName,
    /// `continue`, `hook-error` or `conflicted`
    pub mode: String,
    /// Human-readable mode detail, e.g. the failed hook
    #[serde(default)]
    pub detail: String,
    /// Recorded operation kind
    pub kind: String,
    /// Recorded operation step
    pub step: String,
    #[serde(default)]
    pub hook: Option<HookInfo>,
    #[serde(default)]
    pub deployed: Option<BundleUrl>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub leader: bool,
}

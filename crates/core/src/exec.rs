// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ad hoc command requests and their captured results.

use crate::relation::RelationId;
use crate::unit::UnitName;
use serde::{Deserialize, Serialize};

/// Commands to run in a hook-like context on behalf of an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArgs {
    pub commands: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_id: Option<RelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_unit: Option<UnitName>,
    /// Skip validation of the relation context against known relations
    #[serde(default)]
    pub force_remote_unit: bool,
}

impl CommandArgs {
    pub fn new(commands: impl Into<String>) -> Self {
        Self {
            commands: commands.into(),
            relation_id: None,
            remote_unit: None,
            force_remote_unit: false,
        }
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecResponse {
    pub code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

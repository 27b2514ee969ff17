// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use ua_core::{CommandArgs, ResolvedMode};

/// Request from a client to the unit agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check
    Ping,

    /// Version handshake
    Hello { version: String },

    /// Run commands in the unit's hook context
    RunCommands { args: CommandArgs },

    /// Current mode and operation state
    Status,

    /// Clear a hook error or upgrade conflict
    Resolve { mode: ResolvedMode },

    /// Stop the agent
    Shutdown,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;

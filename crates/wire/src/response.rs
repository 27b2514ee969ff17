// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use ua_core::ExecResponse;

use super::UnitStatus;

/// Response from the unit agent to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Version handshake response
    Hello { version: String },

    /// Agent is shutting down
    ShuttingDown,

    /// Output of a `RunCommands` request
    Exec { response: ExecResponse },

    /// Agent status
    Status { status: Box<UnitStatus> },

    /// Error response
    Error { message: String },
}

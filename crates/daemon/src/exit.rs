// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process exit codes, so a supervisor can tell why `unitd` stopped.

use ua_engine::{AgentError, TaskError};

/// Clean shutdown (signal or `Shutdown` request)
pub const EXIT_OK: u8 = 0;
/// Startup failure or fatal agent error; restart after a delay
pub const EXIT_FATAL: u8 = 1;
/// Unit is dead or unknown; do not restart
pub const EXIT_TERMINATED: u8 = 2;
/// A hook asked for the machine to reboot
pub const EXIT_REBOOT: u8 = 3;

pub fn exit_code(result: &Result<(), TaskError<AgentError>>) -> u8 {
    match result {
        Ok(()) => EXIT_OK,
        Err(TaskError::Failed { error: AgentError::Terminate(_), .. }) => EXIT_TERMINATED,
        Err(TaskError::Failed { error: AgentError::Reboot, .. }) => EXIT_REBOOT,
        Err(_) => EXIT_FATAL,
    }
}

#[cfg(test)]
#[path = "exit_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ua_engine::ExecutorError;
use yare::parameterized;

fn failed(error: AgentError) -> Result<(), TaskError<AgentError>> {
    Err(TaskError::Failed { name: "agent", error })
}

#[parameterized(
    terminated = { AgentError::Terminate("unit wordpress/0 is dead".into()), EXIT_TERMINATED },
    reboot = { AgentError::Reboot, EXIT_REBOOT },
    dying = { AgentError::Dying, EXIT_FATAL },
    executor = { AgentError::Executor(ExecutorError::NeedsReboot), EXIT_FATAL },
)]
fn agent_errors_map_to_exit_codes(error: AgentError, expected: u8) {
    assert_eq!(exit_code(&failed(error)), expected);
}

#[test]
fn clean_stop_exits_zero() {
    assert_eq!(exit_code(&Ok(())), EXIT_OK);
}

#[test]
fn panicked_task_is_fatal() {
    let result = Err(TaskError::Panicked { name: "listener", message: "boom".into() });
    assert_eq!(exit_code(&result), EXIT_FATAL);
}

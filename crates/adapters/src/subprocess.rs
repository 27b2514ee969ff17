// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess helpers shared by the hook runner.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Run `cmd` to completion and capture its output.
///
/// With a timeout the child is killed when it expires. Without one the child
/// runs as long as it likes; dropping the future does not kill it.
pub async fn run_captured(
    mut cmd: Command,
    timeout: Option<Duration>,
    what: &str,
) -> Result<Output, String> {
    cmd.stdin(std::process::Stdio::null());
    match timeout {
        None => cmd.output().await.map_err(|e| format!("{what} failed to start: {e}")),
        Some(limit) => {
            cmd.kill_on_drop(true);
            match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result.map_err(|e| format!("{what} failed to start: {e}")),
                Err(_) => Err(format!("{what} timed out after {}s", limit.as_secs())),
            }
        }
    }
}

/// Lossy UTF-8 rendering of captured output.
pub fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

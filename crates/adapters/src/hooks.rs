// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Running hooks and ad hoc commands as child processes.

use crate::subprocess::{lossy, run_captured};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use ua_core::{CommandArgs, ExecResponse, HookInfo, RelationId, UnitName};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("hook {hook} exited with code {code}")]
    Failed { hook: String, code: i32 },
    #[error("could not run {what}: {message}")]
    Start { what: String, message: String },
}

/// Where and as whom external code runs.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub unit: UnitName,
    /// Deployed bundle contents; hooks live under `hooks/`
    pub charm_dir: PathBuf,
    /// Created by a hook to ask for a machine reboot once it exits
    pub reboot_flag: PathBuf,
    /// Extra environment passed to every process
    pub env: BTreeMap<String, String>,
}

impl HookContext {
    fn environment(
        &self,
        relation_id: Option<RelationId>,
        remote_unit: Option<&UnitName>,
    ) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.insert("UNIT_NAME".into(), self.unit.to_string());
        env.insert("CHARM_DIR".into(), self.charm_dir.display().to_string());
        env.insert("UNIT_REBOOT_FLAG".into(), self.reboot_flag.display().to_string());
        if let Some(id) = relation_id {
            env.insert("RELATION_ID".into(), id.to_string());
        }
        if let Some(unit) = remote_unit {
            env.insert("REMOTE_UNIT".into(), unit.to_string());
        }
        env
    }
}

/// Result of a hook that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookOutcome {
    /// False when the bundle does not implement the hook
    pub ran: bool,
    /// The hook asked for a reboot after it finished
    pub reboot: bool,
}

#[async_trait]
pub trait HookRunner: Clone + Send + Sync + 'static {
    /// Run the hook file `name` for `hook`. A missing hook file is a no-op.
    async fn run_hook(
        &self,
        ctx: &HookContext,
        name: &str,
        hook: &HookInfo,
    ) -> Result<HookOutcome, HookError>;

    /// Run operator commands in the hook environment and capture their output.
    ///
    /// A nonzero exit is reported in the response, not as an error.
    async fn run_commands(
        &self,
        ctx: &HookContext,
        args: &CommandArgs,
    ) -> Result<ExecResponse, HookError>;
}

/// Runs hooks and commands as real processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    command_timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill ad hoc commands that run longer than `timeout`. Hooks are never
    /// time limited.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

fn take_reboot_flag(ctx: &HookContext) -> bool {
    std::fs::remove_file(&ctx.reboot_flag).is_ok()
}

#[async_trait]
impl HookRunner for ProcessRunner {
    async fn run_hook(
        &self,
        ctx: &HookContext,
        name: &str,
        hook: &HookInfo,
    ) -> Result<HookOutcome, HookError> {
        let path = ctx.charm_dir.join("hooks").join(name);
        if !path.is_file() {
            tracing::info!(hook = name, "skipped missing hook");
            return Ok(HookOutcome { ran: false, reboot: false });
        }
        let _ = take_reboot_flag(ctx);

        let mut env = ctx.environment(hook.relation_id, hook.remote_unit.as_ref());
        env.insert("HOOK_NAME".into(), name.to_string());
        let mut cmd = tokio::process::Command::new(&path);
        cmd.current_dir(&ctx.charm_dir).envs(&env);

        tracing::info!(hook = name, unit = %ctx.unit, "running hook");
        let output = run_captured(cmd, None, name)
            .await
            .map_err(|message| HookError::Start { what: name.to_string(), message })?;
        if !output.stdout.is_empty() {
            tracing::info!(hook = name, stdout = %lossy(&output.stdout), "hook stdout");
        }
        if !output.stderr.is_empty() {
            tracing::warn!(hook = name, stderr = %lossy(&output.stderr), "hook stderr");
        }

        let reboot = take_reboot_flag(ctx);
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(HookError::Failed { hook: name.to_string(), code });
        }
        Ok(HookOutcome { ran: true, reboot })
    }

    async fn run_commands(
        &self,
        ctx: &HookContext,
        args: &CommandArgs,
    ) -> Result<ExecResponse, HookError> {
        let env = ctx.environment(args.relation_id, args.remote_unit.as_ref());
        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg("-c").arg(&args.commands).current_dir(&ctx.charm_dir).envs(&env);

        tracing::info!(unit = %ctx.unit, commands = %args.commands, "running commands");
        let output = run_captured(cmd, self.command_timeout, "commands")
            .await
            .map_err(|message| HookError::Start { what: "commands".into(), message })?;
        Ok(ExecResponse {
            code: output.status.code().unwrap_or(-1),
            stdout: lossy(&output.stdout),
            stderr: lossy(&output.stderr),
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{HookContext, HookError, HookOutcome, HookRunner};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;
    use ua_core::{CommandArgs, ExecResponse, HookInfo};

    /// A recorded invocation: a hook by file name, or a command string
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum HookCall {
        Hook { name: String, info: HookInfo },
        Commands(String),
    }

    impl HookCall {
        pub fn name(&self) -> &str {
            match self {
                HookCall::Hook { name, .. } => name,
                HookCall::Commands(cmds) => cmds,
            }
        }
    }

    #[derive(Default)]
    struct FakeRunnerState {
        calls: Vec<HookCall>,
        failing: HashSet<String>,
        missing: HashSet<String>,
        reboot: HashSet<String>,
        response: Option<ExecResponse>,
    }

    /// Hook runner that records calls and fails on request
    #[derive(Clone, Default)]
    pub struct FakeHookRunner {
        inner: Arc<Mutex<FakeRunnerState>>,
    }

    impl FakeHookRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make hook `name` exit nonzero until [`Self::heal`] is called
        pub fn fail(&self, name: &str) {
            self.inner.lock().failing.insert(name.to_string());
        }

        pub fn heal(&self, name: &str) {
            self.inner.lock().failing.remove(name);
        }

        /// Treat hook `name` as absent from the bundle
        pub fn missing(&self, name: &str) {
            self.inner.lock().missing.insert(name.to_string());
        }

        /// Make hook `name` request a reboot
        pub fn reboot_after(&self, name: &str) {
            self.inner.lock().reboot.insert(name.to_string());
        }

        pub fn set_response(&self, response: ExecResponse) {
            self.inner.lock().response = Some(response);
        }

        pub fn calls(&self) -> Vec<HookCall> {
            self.inner.lock().calls.clone()
        }

        /// File names of hooks that ran, in order
        pub fn hook_names(&self) -> Vec<String> {
            self.inner
                .lock()
                .calls
                .iter()
                .filter_map(|c| match c {
                    HookCall::Hook { name, .. } => Some(name.clone()),
                    HookCall::Commands(_) => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl HookRunner for FakeHookRunner {
        async fn run_hook(
            &self,
            _ctx: &HookContext,
            name: &str,
            hook: &HookInfo,
        ) -> Result<HookOutcome, HookError> {
            let mut s = self.inner.lock();
            if s.missing.contains(name) {
                return Ok(HookOutcome { ran: false, reboot: false });
            }
            s.calls.push(HookCall::Hook { name: name.to_string(), info: hook.clone() });
            if s.failing.contains(name) {
                return Err(HookError::Failed { hook: name.to_string(), code: 1 });
            }
            Ok(HookOutcome { ran: true, reboot: s.reboot.remove(name) })
        }

        async fn run_commands(
            &self,
            _ctx: &HookContext,
            args: &CommandArgs,
        ) -> Result<ExecResponse, HookError> {
            let mut s = self.inner.lock();
            s.calls.push(HookCall::Commands(args.commands.clone()));
            Ok(s.response.clone().unwrap_or_else(|| ExecResponse {
                code: 0,
                stdout: args.commands.clone(),
                stderr: String::new(),
            }))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeHookRunner, HookCall};

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;

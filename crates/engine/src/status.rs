// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workload status reporting and the operator-visible agent snapshot.

use parking_lot::Mutex;
use std::sync::Arc;
use ua_adapters::UnitFacade;
use ua_core::{AgentStatus, BundleUrl, HookInfo};
use ua_storage::OperationState;

/// Top-level state of the agent loop
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Continue,
    /// Waiting for an operator to resolve a failed hook
    HookError(HookInfo),
    /// Waiting for an operator to resolve an upgrade conflict
    Conflicted(BundleUrl),
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Continue => "continue",
            Mode::HookError(_) => "hook-error",
            Mode::Conflicted(_) => "conflicted",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Continue => write!(f, "continue"),
            Mode::HookError(hook) => write!(f, "hook-error ({hook})"),
            Mode::Conflicted(url) => write!(f, "conflicted ({url})"),
        }
    }
}

/// What the agent is doing, as published to the command socket
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusReport {
    pub mode: Mode,
    pub state: OperationState,
}

/// Reports workload status through the facade, skipping repeats.
#[derive(Clone)]
pub struct StatusReporter<F> {
    facade: F,
    last: Arc<Mutex<Option<(AgentStatus, String)>>>,
}

impl<F: UnitFacade> StatusReporter<F> {
    pub fn new(facade: F) -> Self {
        Self { facade, last: Arc::new(Mutex::new(None)) }
    }

    /// Report `status`; failures are logged and otherwise ignored.
    pub async fn report(&self, status: AgentStatus, info: &str) {
        let next = (status, info.to_string());
        if self.last.lock().as_ref() == Some(&next) {
            return;
        }
        match self.facade.set_status(status, info).await {
            Ok(()) => {
                tracing::debug!(%status, info, "reported status");
                *self.last.lock() = Some(next);
            }
            Err(e) => tracing::warn!(error = %e, %status, "failed to report status"),
        }
    }

    pub fn last(&self) -> Option<AgentStatus> {
        self.last.lock().as_ref().map(|(s, _)| *s)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted operation state: what the agent is doing and what it must resume.

use crate::atomic::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use ua_core::{BundleUrl, HookInfo, HookInfoError};

/// Class of operation recorded in the state file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    /// Idle, ready for the next operation
    Continue,
    /// Fetch and deploy the first bundle
    Install,
    /// Fetch and deploy a replacement bundle
    Upgrade,
    RunHook,
    RunCommands,
}

ua_core::simple_display! {
    Kind {
        Continue => "continue",
        Install => "install",
        Upgrade => "upgrade",
        RunHook => "run-hook",
        RunCommands => "run-commands",
    }
}

/// Progress of the recorded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Intent recorded, nothing executed yet
    Queued,
    /// External code may have started running
    Started,
    /// Executed successfully; side effects may still need committing
    Done,
    /// Execution failed and awaits operator resolution
    Failed,
}

ua_core::simple_display! {
    Step {
        Queued => "queued",
        Started => "started",
        Done => "done",
        Failed => "failed",
    }
}

/// Errors from reading, writing or validating operation state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid operation state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} operation must be done, got {step}")]
    NotDone { kind: Kind, step: Step },
    #[error("{0} operation must not record a hook")]
    UnexpectedHook(Kind),
    #[error("{0} operation requires a hook")]
    MissingHook(Kind),
    #[error("{0} operation requires a bundle URL")]
    MissingBundle(Kind),
    #[error("{kind} operation cannot be {step}")]
    BadStep { kind: Kind, step: Step },
    #[error(transparent)]
    Hook(#[from] HookInfoError),
}

/// The single source of truth for what the agent was doing.
///
/// On restart the agent resumes from exactly one of: nothing pending
/// (`Continue`), an operation queued but not started, an operation started but
/// not committed, or a failure awaiting resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationState {
    pub kind: Kind,
    pub step: Step,
    /// Hook in progress (RunHook only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookInfo>,
    /// Target bundle of an install or upgrade in progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleUrl>,
    /// Bundle currently deployed in the charm directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed: Option<BundleUrl>,
    /// Most recent hook that committed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hook: Option<HookInfo>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub stopped: bool,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub leader: bool,
}

impl Default for OperationState {
    fn default() -> Self {
        Self {
            kind: Kind::Continue,
            step: Step::Done,
            hook: None,
            bundle: None,
            deployed: None,
            last_hook: None,
            installed: false,
            started: false,
            stopped: false,
            removed: false,
            leader: false,
        }
    }
}

impl OperationState {
    /// True when nothing is queued, running or awaiting resolution.
    pub fn is_idle(&self) -> bool {
        self.kind == Kind::Continue
    }

    /// Copy of this state with a different kind/step and cleared operation
    /// payload; the unit-level flags carry over.
    pub fn with_step(&self, kind: Kind, step: Step) -> Self {
        Self { kind, step, hook: None, bundle: None, ..self.clone() }
    }

    pub fn validate(&self) -> Result<(), StateError> {
        let (kind, step) = (self.kind, self.step);
        match kind {
            Kind::Continue => {
                if step != Step::Done {
                    return Err(StateError::NotDone { kind, step });
                }
                if self.hook.is_some() {
                    return Err(StateError::UnexpectedHook(kind));
                }
            }
            Kind::Install | Kind::Upgrade => {
                if self.hook.is_some() {
                    return Err(StateError::UnexpectedHook(kind));
                }
                if self.bundle.is_none() {
                    return Err(StateError::MissingBundle(kind));
                }
                if kind == Kind::Install && step == Step::Failed {
                    return Err(StateError::BadStep { kind, step });
                }
            }
            Kind::RunHook => match &self.hook {
                Some(hook) => hook.validate()?,
                None => return Err(StateError::MissingHook(kind)),
            },
            Kind::RunCommands => {
                if self.hook.is_some() {
                    return Err(StateError::UnexpectedHook(kind));
                }
                if step == Step::Failed {
                    return Err(StateError::BadStep { kind, step });
                }
            }
        }
        Ok(())
    }
}

/// On-disk home of the [`OperationState`].
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored state, or `None` if it was never written.
    pub fn read(&self) -> Result<Option<OperationState>, StateError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: OperationState = serde_json::from_slice(&bytes)
            .map_err(|source| StateError::Json { path: self.path.clone(), source })?;
        state.validate()?;
        Ok(Some(state))
    }

    /// Validate and atomically replace the stored state.
    pub fn write(&self, state: &OperationState) -> Result<(), StateError> {
        state.validate()?;
        let json = serde_json::to_vec_pretty(state)
            .map_err(|source| StateError::Json { path: self.path.clone(), source })?;
        write_atomic(&self.path, &json)?;
        tracing::debug!(kind = %state.kind, step = %state.step, "wrote operation state");
        Ok(())
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;

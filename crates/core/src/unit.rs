// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The unit owned by this agent: identity, life and resolution state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected unit name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid unit name {0:?}")]
pub struct UnitNameError(pub String);

fn validate_unit_name(s: &str) -> Result<(), UnitNameError> {
    let err = || UnitNameError(s.to_string());
    let (app, num) = s.split_once('/').ok_or_else(err)?;
    let app_ok = !app.is_empty()
        && app.starts_with(|c: char| c.is_ascii_lowercase())
        && app.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !app.ends_with('-');
    let num_ok = !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    if app_ok && num_ok {
        Ok(())
    } else {
        Err(err())
    }
}

crate::define_name! {
    /// Name of a unit, `<application>/<number>` (e.g. `wordpress/0`).
    pub struct UnitName(validate_unit_name) -> UnitNameError;
}

impl UnitName {
    /// Application the unit belongs to.
    pub fn application(&self) -> &str {
        self.0.split_once('/').map(|(app, _)| app).unwrap_or(&self.0)
    }

    /// Tag form used in identities and file names (`unit-wordpress-0`).
    pub fn tag(&self) -> String {
        format!("unit-{}", self.0.replace('/', "-"))
    }
}

/// Lifecycle phase of a unit, as seen by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Life {
    #[default]
    Alive,
    Dying,
    Dead,
}

crate::simple_display! {
    Life {
        Alive => "alive",
        Dying => "dying",
        Dead => "dead",
    }
}

/// Operator instruction for leaving hook-error mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedMode {
    /// Nothing requested
    #[default]
    None,
    /// Run the failed hook again
    RetryHooks,
    /// Treat the failed hook as if it had succeeded, without running it
    NoHooks,
}

crate::simple_display! {
    ResolvedMode {
        None => "none",
        RetryHooks => "retry-hooks",
        NoHooks => "no-hooks",
    }
}

/// Point-in-time view of the unit as reported by the facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub name: UnitName,
    pub life: Life,
    #[serde(default)]
    pub resolved: ResolvedMode,
}

/// Workload status reported back to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Allocating,
    Executing,
    Idle,
    Error,
    Rebooting,
    Failed,
}

crate::simple_display! {
    AgentStatus {
        Allocating => "allocating",
        Executing => "executing",
        Idle => "idle",
        Error => "error",
        Rebooting => "rebooting",
        Failed => "failed",
    }
}

#[cfg(test)]
#[path = "unit_tests.rs"]
mod tests;

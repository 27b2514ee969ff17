// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook kinds and the description of a single hook invocation.

use crate::relation::RelationId;
use crate::unit::UnitName;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every hook the agent knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    Install,
    Start,
    ConfigChanged,
    UpgradeCharm,
    Stop,
    Remove,
    UpdateStatus,
    CollectMetrics,
    LeaderElected,
    LeaderDeposed,
    LeaderSettingsChanged,
    RelationJoined,
    RelationChanged,
    RelationDeparted,
    RelationBroken,
}

crate::simple_display! {
    HookKind {
        Install => "install",
        Start => "start",
        ConfigChanged => "config-changed",
        UpgradeCharm => "upgrade-charm",
        Stop => "stop",
        Remove => "remove",
        UpdateStatus => "update-status",
        CollectMetrics => "collect-metrics",
        LeaderElected => "leader-elected",
        LeaderDeposed => "leader-deposed",
        LeaderSettingsChanged => "leader-settings-changed",
        RelationJoined => "relation-joined",
        RelationChanged => "relation-changed",
        RelationDeparted => "relation-departed",
        RelationBroken => "relation-broken",
    }
}

impl HookKind {
    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            HookKind::RelationJoined
                | HookKind::RelationChanged
                | HookKind::RelationDeparted
                | HookKind::RelationBroken
        )
    }

    /// Hooks that may only run while the unit holds leadership.
    pub fn needs_leadership(&self) -> bool {
        matches!(self, HookKind::LeaderElected)
    }
}

/// Reasons a [`HookInfo`] is malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookInfoError {
    #[error("{0} hook requires a relation id")]
    MissingRelation(HookKind),
    #[error("{0} hook requires a remote unit")]
    MissingRemoteUnit(HookKind),
    #[error("{0} hook must not name a relation")]
    UnexpectedRelation(HookKind),
}

/// A single hook to run, with its relation context when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookInfo {
    pub kind: HookKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_id: Option<RelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_unit: Option<UnitName>,
    /// Settings version of the remote unit when the hook was queued
    #[serde(default)]
    pub change_version: i64,
}

impl HookInfo {
    pub fn new(kind: HookKind) -> Self {
        Self { kind, relation_id: None, remote_unit: None, change_version: 0 }
    }

    pub fn relation(kind: HookKind, relation_id: RelationId, remote_unit: Option<UnitName>) -> Self {
        Self { kind, relation_id: Some(relation_id), remote_unit, change_version: 0 }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.change_version = version;
        self
    }

    pub fn validate(&self) -> Result<(), HookInfoError> {
        if !self.kind.is_relation() {
            return match self.relation_id {
                Some(_) => Err(HookInfoError::UnexpectedRelation(self.kind)),
                None => Ok(()),
            };
        }
        if self.relation_id.is_none() {
            return Err(HookInfoError::MissingRelation(self.kind));
        }
        let needs_remote =
            matches!(self.kind, HookKind::RelationJoined | HookKind::RelationDeparted);
        if needs_remote && self.remote_unit.is_none() {
            return Err(HookInfoError::MissingRemoteUnit(self.kind));
        }
        Ok(())
    }
}

impl std::fmt::Display for HookInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.relation_id, &self.remote_unit) {
            (Some(id), Some(unit)) => write!(f, "{} (relation {}, unit {})", self.kind, id, unit),
            (Some(id), None) => write!(f, "{} (relation {})", self.kind, id),
            _ => write!(f, "{}", self.kind),
        }
    }
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;

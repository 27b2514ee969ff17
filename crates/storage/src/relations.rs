// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-relation membership records, one file per relation.

use crate::atomic::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use ua_core::{HookInfo, HookKind, RelationId, UnitName};

#[derive(Debug, Error)]
pub enum RelationStateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid relation state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("expected hook for relation {expected}, got {hook}")]
    WrongRelation { expected: RelationId, hook: HookInfo },
    #[error("unit {unit} already joined relation {relation_id}")]
    AlreadyJoined { relation_id: RelationId, unit: UnitName },
    #[error("unit {unit} is not a member of relation {relation_id}")]
    NotMember { relation_id: RelationId, unit: UnitName },
    #[error("relation {0} cannot be broken while it has members")]
    HasMembers(RelationId),
    #[error("expected relation-changed for {unit}, got {hook}")]
    PendingChange { unit: UnitName, hook: HookInfo },
    #[error("{0} is not a relation hook")]
    NotRelationHook(HookKind),
}

/// What this unit has already told its hooks about one relation.
///
/// `members` maps each joined remote unit to the settings version its last
/// relation-changed hook observed. `changed_pending` names a unit whose
/// relation-joined has committed but whose first relation-changed has not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationState {
    pub relation_id: RelationId,
    /// Local endpoint name, used to name this relation's hooks
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub members: BTreeMap<UnitName, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_pending: Option<UnitName>,
}

impl RelationState {
    pub fn new(relation_id: RelationId, endpoint: impl Into<String>) -> Self {
        Self {
            relation_id,
            endpoint: endpoint.into(),
            members: BTreeMap::new(),
            changed_pending: None,
        }
    }

    /// Check that `hook` is a legal next hook for this relation.
    pub fn validate(&self, hook: &HookInfo) -> Result<(), RelationStateError> {
        if !hook.kind.is_relation() {
            return Err(RelationStateError::NotRelationHook(hook.kind));
        }
        if hook.relation_id != Some(self.relation_id) {
            return Err(RelationStateError::WrongRelation {
                expected: self.relation_id,
                hook: hook.clone(),
            });
        }
        if let Some(pending) = &self.changed_pending {
            let ok = hook.kind == HookKind::RelationChanged
                && hook.remote_unit.as_ref() == Some(pending);
            if !ok {
                return Err(RelationStateError::PendingChange {
                    unit: pending.clone(),
                    hook: hook.clone(),
                });
            }
        }
        let relation_id = self.relation_id;
        match (hook.kind, &hook.remote_unit) {
            (HookKind::RelationBroken, _) if !self.members.is_empty() => {
                Err(RelationStateError::HasMembers(relation_id))
            }
            (HookKind::RelationJoined, Some(unit)) if self.members.contains_key(unit) => {
                Err(RelationStateError::AlreadyJoined { relation_id, unit: unit.clone() })
            }
            (HookKind::RelationChanged | HookKind::RelationDeparted, Some(unit))
                if !self.members.contains_key(unit) =>
            {
                Err(RelationStateError::NotMember { relation_id, unit: unit.clone() })
            }
            _ => Ok(()),
        }
    }

    /// Record the effect of a committed hook.
    pub fn apply(&mut self, hook: &HookInfo) -> Result<(), RelationStateError> {
        self.validate(hook)?;
        let Some(unit) = hook.remote_unit.clone() else {
            return Ok(());
        };
        match hook.kind {
            HookKind::RelationJoined => {
                self.members.insert(unit.clone(), hook.change_version);
                self.changed_pending = Some(unit);
            }
            HookKind::RelationChanged => {
                self.members.insert(unit, hook.change_version);
                self.changed_pending = None;
            }
            HookKind::RelationDeparted => {
                self.members.remove(&unit);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Directory holding one `<relation-id>.json` file per known relation.
#[derive(Debug, Clone)]
pub struct RelationStateDir {
    dir: PathBuf,
}

impl RelationStateDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn file(&self, id: RelationId) -> PathBuf {
        self.dir.join(format!("{}.json", id.0))
    }

    /// Load every stored relation. A missing directory means none.
    pub fn read_all(&self) -> Result<BTreeMap<RelationId, RelationState>, RelationStateError> {
        let mut out = BTreeMap::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let state: RelationState = serde_json::from_slice(&bytes)
                .map_err(|source| RelationStateError::Json { path: path.clone(), source })?;
            out.insert(state.relation_id, state);
        }
        Ok(out)
    }

    /// Create an empty record for `id` unless one already exists.
    pub fn ensure(
        &self,
        id: RelationId,
        endpoint: &str,
    ) -> Result<RelationState, RelationStateError> {
        let path = self.file(id);
        if path.exists() {
            let bytes = std::fs::read(&path)?;
            return serde_json::from_slice(&bytes)
                .map_err(|source| RelationStateError::Json { path, source });
        }
        let state = RelationState::new(id, endpoint);
        self.write(&state)?;
        Ok(state)
    }

    pub fn write(&self, state: &RelationState) -> Result<(), RelationStateError> {
        let path = self.file(state.relation_id);
        let json = serde_json::to_vec_pretty(state)
            .map_err(|source| RelationStateError::Json { path: path.clone(), source })?;
        write_atomic(&path, &json)?;
        Ok(())
    }

    /// Forget a relation after relation-broken committed. Missing is fine.
    pub fn remove(&self, id: RelationId) -> Result<(), RelationStateError> {
        match std::fs::remove_file(self.file(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "relations_tests.rs"]
mod tests;

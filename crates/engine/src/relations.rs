// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relation bookkeeping and the relation hook queue.
//!
//! Membership changes are turned into hooks in the order they arrive and
//! queued first-in first-out. A unit's first relation-changed after it joins
//! is tracked by the persisted state instead of the queue, so it survives a
//! restart and always runs before anything else for that relation.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;
use ua_core::{HookInfo, HookKind, Life, RelationId, RelationInfo, RelationUnitsChange, UnitName};
use ua_storage::{RelationState, RelationStateDir, RelationStateError};

#[derive(Debug, Error)]
pub enum RelationsError {
    #[error("unknown relation {0}")]
    UnknownRelation(RelationId),
    #[error(transparent)]
    State(#[from] RelationStateError),
}

pub struct Relations {
    dir: RelationStateDir,
    states: BTreeMap<RelationId, RelationState>,
    /// Membership once every queued hook has run
    expected: BTreeMap<RelationId, BTreeMap<UnitName, i64>>,
    /// Relations with relation-broken already queued
    broken: BTreeSet<RelationId>,
    queue: VecDeque<HookInfo>,
}

impl Relations {
    /// Load persisted relation state.
    pub fn load(dir: RelationStateDir) -> Result<Self, RelationsError> {
        let states = dir.read_all()?;
        let expected = states.iter().map(|(id, s)| (*id, s.members.clone())).collect();
        Ok(Self { dir, states, expected, broken: BTreeSet::new(), queue: VecDeque::new() })
    }

    pub fn ids(&self) -> Vec<RelationId> {
        self.states.keys().copied().collect()
    }

    pub fn contains(&self, id: RelationId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn is_member(&self, id: RelationId, unit: &UnitName) -> bool {
        self.states.get(&id).is_some_and(|s| s.members.contains_key(unit))
    }

    /// True when no relation remains.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Start tracking a relation. Returns whether it was new.
    ///
    /// A relation that is no longer alive is treated as gone instead.
    pub fn join(&mut self, info: &RelationInfo) -> Result<bool, RelationsError> {
        if info.life != Life::Alive {
            self.gone(info.id);
            return Ok(false);
        }
        if self.states.contains_key(&info.id) {
            return Ok(false);
        }
        let state = self.dir.ensure(info.id, &info.endpoint)?;
        tracing::info!(relation = %info.id, key = %info.key, "joined relation");
        self.expected.insert(info.id, state.members.clone());
        self.states.insert(info.id, state);
        Ok(true)
    }

    /// Queue departures for every remaining member followed by
    /// relation-broken. Returns false if the relation was unknown.
    pub fn gone(&mut self, id: RelationId) -> bool {
        if !self.states.contains_key(&id) {
            return false;
        }
        if !self.broken.insert(id) {
            return true;
        }
        let members = self.expected.remove(&id).unwrap_or_default();
        for unit in members.into_keys() {
            self.queue.push_back(HookInfo::relation(HookKind::RelationDeparted, id, Some(unit)));
        }
        self.queue.push_back(HookInfo::relation(HookKind::RelationBroken, id, None));
        self.expected.insert(id, BTreeMap::new());
        true
    }

    /// Leave every relation, as a dying unit must.
    pub fn depart_all(&mut self) {
        for id in self.ids() {
            self.gone(id);
        }
    }

    /// Turn a membership delta into queued hooks.
    ///
    /// A new unit queues relation-joined; a known unit with a new settings
    /// version queues relation-changed; a departing member queues
    /// relation-departed. Deltas that match what is already expected queue
    /// nothing.
    pub fn apply_units(&mut self, change: &RelationUnitsChange) -> Result<usize, RelationsError> {
        let id = change.relation_id;
        if !self.states.contains_key(&id) {
            return Err(RelationsError::UnknownRelation(id));
        }
        if self.broken.contains(&id) {
            return Ok(0);
        }
        let expected = self.expected.entry(id).or_default();
        let before = self.queue.len();
        for (unit, version) in &change.changed {
            let kind = match expected.get(unit) {
                None => HookKind::RelationJoined,
                Some(known) if known != version => HookKind::RelationChanged,
                Some(_) => continue,
            };
            expected.insert(unit.clone(), *version);
            self.queue
                .push_back(HookInfo::relation(kind, id, Some(unit.clone())).with_version(*version));
        }
        for unit in &change.departed {
            if expected.remove(unit).is_some() {
                self.queue
                    .push_back(HookInfo::relation(HookKind::RelationDeparted, id, Some(unit.clone())));
            }
        }
        Ok(self.queue.len() - before)
    }

    /// The next relation hook to run, if any.
    pub fn next_hook(&self) -> Option<HookInfo> {
        let pending = self.states.values().find_map(|s| {
            let unit = s.changed_pending.as_ref()?;
            let version = s.members.get(unit).copied().unwrap_or_default();
            Some(
                HookInfo::relation(HookKind::RelationChanged, s.relation_id, Some(unit.clone()))
                    .with_version(version),
            )
        });
        pending.or_else(|| self.queue.front().cloned())
    }

    pub fn validate(&self, hook: &HookInfo) -> Result<(), RelationsError> {
        let id = hook.relation_id.ok_or(RelationsError::UnknownRelation(RelationId(-1)))?;
        let state = self.states.get(&id).ok_or(RelationsError::UnknownRelation(id))?;
        state.validate(hook)?;
        Ok(())
    }

    /// File name of the hook: `<endpoint>-relation-<event>`.
    pub fn hook_name(&self, hook: &HookInfo) -> String {
        let endpoint = hook
            .relation_id
            .and_then(|id| self.states.get(&id))
            .map(|s| s.endpoint.as_str())
            .unwrap_or("unknown");
        format!("{endpoint}-{}", hook.kind)
    }

    /// Record a hook that ran (or was skipped) and drop it from the queue.
    pub fn commit(&mut self, hook: &HookInfo) -> Result<(), RelationsError> {
        let id = hook.relation_id.ok_or(RelationsError::UnknownRelation(RelationId(-1)))?;
        let state = self.states.get_mut(&id).ok_or(RelationsError::UnknownRelation(id))?;
        state.apply(hook)?;
        if let Some(pos) = self.queue.iter().position(|q| q == hook) {
            self.queue.remove(pos);
        }
        if hook.kind == HookKind::RelationBroken {
            self.dir.remove(id)?;
            self.states.remove(&id);
            self.expected.remove(&id);
            self.broken.remove(&id);
            tracing::info!(relation = %id, "left relation");
            return Ok(());
        }
        if hook.kind == HookKind::RelationJoined {
            if let (Some(unit), Some(expected)) = (&hook.remote_unit, self.expected.get_mut(&id)) {
                expected.entry(unit.clone()).or_insert(hook.change_version);
            }
        }
        self.dir.write(state)?;
        Ok(())
    }

    /// Forget a hook that can no longer run, without recording it as run.
    pub fn discard(&mut self, hook: &HookInfo) -> Result<(), RelationsError> {
        if let Some(pos) = self.queue.iter().position(|q| q == hook) {
            self.queue.remove(pos);
            return Ok(());
        }
        let Some(state) = hook.relation_id.and_then(|id| self.states.get_mut(&id)) else {
            return Ok(());
        };
        if hook.kind == HookKind::RelationChanged
            && state.changed_pending.is_some()
            && state.changed_pending == hook.remote_unit
        {
            state.changed_pending = None;
            self.dir.write(state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "relations_tests.rs"]
mod tests;

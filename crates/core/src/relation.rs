// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relations between this unit's application and others.

use crate::unit::{Life, UnitName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Control-plane identifier of a relation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RelationId(pub i32);

impl std::fmt::Display for RelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationScope {
    #[default]
    Global,
    Container,
}

crate::simple_display! {
    RelationScope {
        Global => "global",
        Container => "container",
    }
}

/// Static description of a relation, as seen from this unit's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub id: RelationId,
    /// Human-readable key, e.g. `wordpress:db mysql:server`
    pub key: String,
    /// Name of this unit's endpoint, used to build hook names
    pub endpoint: String,
    pub interface: String,
    #[serde(default)]
    pub scope: RelationScope,
    #[serde(default)]
    pub life: Life,
}

/// Delta in the remote membership of one relation.
///
/// `changed` maps each remote unit whose settings are new or updated to the
/// settings version; `departed` lists units that left the relation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationUnitsChange {
    pub relation_id: RelationId,
    #[serde(default)]
    pub changed: BTreeMap<UnitName, i64>,
    #[serde(default)]
    pub departed: Vec<UnitName>,
}

impl RelationUnitsChange {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.departed.is_empty()
    }
}

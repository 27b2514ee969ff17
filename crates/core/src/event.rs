// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events delivered to the agent loop by the event filter.

use crate::bundle::BundleUrl;
use crate::relation::{RelationId, RelationUnitsChange};
use crate::unit::{Life, ResolvedMode};
use serde::{Deserialize, Serialize};

/// A normalized remote-change notification.
///
/// Serializes with `{"type": "scope:name", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The unit's life changed
    #[serde(rename = "unit:life")]
    UnitLife { life: Life },

    /// The operator asked to resolve a hook error
    #[serde(rename = "unit:resolved")]
    Resolved { mode: ResolvedMode },

    #[serde(rename = "config:changed")]
    ConfigChanged,

    /// The application's bundle changed
    #[serde(rename = "bundle:upgrade")]
    UpgradeRequested { url: BundleUrl, force: bool },

    /// Relations were added, removed or changed life
    #[serde(rename = "relations:changed")]
    RelationsChanged { ids: Vec<RelationId> },

    /// Remote membership of one relation changed
    #[serde(rename = "relation:units")]
    RelationUnits { change: RelationUnitsChange },

    #[serde(rename = "leader:settings")]
    LeaderSettingsChanged,

    #[serde(rename = "leader:changed")]
    LeadershipChanged { leader: bool },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UnitLife { .. } => "unit:life",
            Event::Resolved { .. } => "unit:resolved",
            Event::ConfigChanged => "config:changed",
            Event::UpgradeRequested { .. } => "bundle:upgrade",
            Event::RelationsChanged { .. } => "relations:changed",
            Event::RelationUnits { .. } => "relation:units",
            Event::LeaderSettingsChanged => "leader:settings",
            Event::LeadershipChanged { .. } => "leader:changed",
        }
    }

    /// One-line summary for log output
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::UnitLife { life } => format!("{t} life={life}"),
            Event::Resolved { mode } => format!("{t} mode={mode}"),
            Event::UpgradeRequested { url, force } => format!("{t} url={url} force={force}"),
            Event::RelationsChanged { ids } => format!("{t} ids={ids:?}"),
            Event::RelationUnits { change } => format!(
                "{t} relation={} changed={} departed={}",
                change.relation_id,
                change.changed.len(),
                change.departed.len()
            ),
            Event::LeadershipChanged { leader } => format!("{t} leader={leader}"),
            Event::ConfigChanged | Event::LeaderSettingsChanged => t.to_string(),
        }
    }
}

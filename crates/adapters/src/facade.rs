// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-plane view of this unit.
//!
//! Point queries fetch current values; `watch_*` calls open a subscription
//! whose first message carries the current value and whose later messages
//! carry changes. A subscription that yields `Err` is broken and delivers
//! nothing further.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use ua_core::{
    AgentStatus, BundleInfo, BundleUrl, RelationId, RelationInfo, RelationUnitsChange,
    UnitSnapshot,
};

/// Errors from the control plane
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacadeError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl FacadeError {
    /// Whether this error means the agent can never make progress again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FacadeError::NotFound(_) | FacadeError::Unauthorized(_))
    }
}

/// Receiving half of a subscription.
pub type Watch<T> = mpsc::Receiver<Result<T, FacadeError>>;

/// The bundle the application wants its units to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleTarget {
    pub url: BundleUrl,
    /// Upgrade even if the unit is in an error state
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
pub trait UnitFacade: Clone + Send + Sync + 'static {
    async fn unit(&self) -> Result<UnitSnapshot, FacadeError>;

    async fn bundle_target(&self) -> Result<Option<BundleTarget>, FacadeError>;

    /// Hash and download locations of a bundle
    async fn bundle_info(&self, url: &BundleUrl) -> Result<BundleInfo, FacadeError>;

    async fn relation(&self, id: RelationId) -> Result<RelationInfo, FacadeError>;

    async fn set_status(&self, status: AgentStatus, info: &str) -> Result<(), FacadeError>;

    /// Record the bundle now deployed in the unit's charm directory
    async fn set_deployed(&self, url: &BundleUrl) -> Result<(), FacadeError>;

    /// Acknowledge an operator resolution request
    async fn clear_resolved(&self) -> Result<(), FacadeError>;

    /// Report that the unit finished tearing itself down
    async fn ensure_dead(&self) -> Result<(), FacadeError>;

    fn watch_unit(&self) -> Watch<UnitSnapshot>;

    fn watch_config(&self) -> Watch<()>;

    fn watch_bundle(&self) -> Watch<BundleTarget>;

    /// Ids of relations that appeared, vanished or changed life
    fn watch_relations(&self) -> Watch<Vec<RelationId>>;

    fn watch_relation_units(&self, id: RelationId) -> Watch<RelationUnitsChange>;

    fn watch_leader_settings(&self) -> Watch<()>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{BundleTarget, FacadeError, UnitFacade, Watch};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use ua_core::{
        AgentStatus, BundleInfo, BundleUrl, Life, RelationId, RelationInfo, RelationUnitsChange,
        ResolvedMode, UnitName, UnitSnapshot,
    };

    const CAPACITY: usize = 64;

    type Tx<T> = mpsc::Sender<Result<T, FacadeError>>;

    struct FakeFacadeState {
        unit: UnitSnapshot,
        target: Option<BundleTarget>,
        bundles: HashMap<BundleUrl, BundleInfo>,
        relations: BTreeMap<RelationId, RelationInfo>,
        members: BTreeMap<RelationId, BTreeMap<UnitName, i64>>,
        statuses: Vec<(AgentStatus, String)>,
        deployed: Vec<BundleUrl>,
        resolved_cleared: usize,
        dead: bool,
        unit_tx: Option<Tx<UnitSnapshot>>,
        config_tx: Option<Tx<()>>,
        bundle_tx: Option<Tx<BundleTarget>>,
        relations_tx: Option<Tx<Vec<RelationId>>>,
        units_tx: HashMap<RelationId, Tx<RelationUnitsChange>>,
        leader_settings_tx: Option<Tx<()>>,
        leader_settings_subscribed: usize,
    }

    fn push<T>(tx: &Option<Tx<T>>, value: T) {
        if let Some(tx) = tx {
            let _ = tx.try_send(Ok(value));
        }
    }

    fn open<T>(initial: Option<T>) -> (Tx<T>, Watch<T>) {
        let (tx, rx) = mpsc::channel(CAPACITY);
        if let Some(value) = initial {
            let _ = tx.try_send(Ok(value));
        }
        (tx, rx)
    }

    /// In-memory control plane for tests.
    ///
    /// Subscriptions deliver their initial value on open, then whatever the
    /// test pushes through the mutation helpers.
    #[derive(Clone)]
    pub struct FakeFacade {
        inner: Arc<Mutex<FakeFacadeState>>,
    }

    impl FakeFacade {
        pub fn new(unit: UnitName) -> Self {
            let unit = UnitSnapshot { name: unit, life: Life::Alive, resolved: ResolvedMode::None };
            Self {
                inner: Arc::new(Mutex::new(FakeFacadeState {
                    unit,
                    target: None,
                    bundles: HashMap::new(),
                    relations: BTreeMap::new(),
                    members: BTreeMap::new(),
                    statuses: Vec::new(),
                    deployed: Vec::new(),
                    resolved_cleared: 0,
                    dead: false,
                    unit_tx: None,
                    config_tx: None,
                    bundle_tx: None,
                    relations_tx: None,
                    units_tx: HashMap::new(),
                    leader_settings_tx: None,
                    leader_settings_subscribed: 0,
                })),
            }
        }

        /// Register a bundle and make it the application's target.
        pub fn set_bundle(&self, info: BundleInfo, force: bool) {
            let mut s = self.inner.lock();
            let target = BundleTarget { url: info.url.clone(), force };
            s.bundles.insert(info.url.clone(), info);
            s.target = Some(target.clone());
            push(&s.bundle_tx, target);
        }

        pub fn set_life(&self, life: Life) {
            let mut s = self.inner.lock();
            s.unit.life = life;
            let unit = s.unit.clone();
            push(&s.unit_tx, unit);
        }

        pub fn set_resolved(&self, mode: ResolvedMode) {
            let mut s = self.inner.lock();
            s.unit.resolved = mode;
            let unit = s.unit.clone();
            push(&s.unit_tx, unit);
        }

        pub fn change_config(&self) {
            push(&self.inner.lock().config_tx, ());
        }

        pub fn change_leader_settings(&self) {
            push(&self.inner.lock().leader_settings_tx, ());
        }

        pub fn add_relation(&self, info: RelationInfo) {
            let mut s = self.inner.lock();
            let id = info.id;
            s.relations.insert(id, info);
            s.members.entry(id).or_default();
            push(&s.relations_tx, vec![id]);
        }

        pub fn set_relation_life(&self, id: RelationId, life: Life) {
            let mut s = self.inner.lock();
            if let Some(info) = s.relations.get_mut(&id) {
                info.life = life;
            }
            push(&s.relations_tx, vec![id]);
        }

        /// Remote unit joins or changes its settings.
        pub fn change_unit(&self, id: RelationId, unit: UnitName, version: i64) {
            let mut s = self.inner.lock();
            s.members.entry(id).or_default().insert(unit.clone(), version);
            let mut change = RelationUnitsChange { relation_id: id, ..Default::default() };
            change.changed.insert(unit, version);
            if let Some(tx) = s.units_tx.get(&id) {
                let _ = tx.try_send(Ok(change));
            }
        }

        pub fn depart_unit(&self, id: RelationId, unit: UnitName) {
            let mut s = self.inner.lock();
            if let Some(members) = s.members.get_mut(&id) {
                members.remove(&unit);
            }
            let change =
                RelationUnitsChange { relation_id: id, departed: vec![unit], ..Default::default() };
            if let Some(tx) = s.units_tx.get(&id) {
                let _ = tx.try_send(Ok(change));
            }
        }

        /// Break the unit subscription with `err`.
        pub fn fail_unit_watch(&self, err: FacadeError) {
            if let Some(tx) = &self.inner.lock().unit_tx {
                let _ = tx.try_send(Err(err));
            }
        }

        pub fn statuses(&self) -> Vec<(AgentStatus, String)> {
            self.inner.lock().statuses.clone()
        }

        pub fn last_status(&self) -> Option<AgentStatus> {
            self.inner.lock().statuses.last().map(|(s, _)| *s)
        }

        pub fn deployed(&self) -> Vec<BundleUrl> {
            self.inner.lock().deployed.clone()
        }

        pub fn resolved_cleared(&self) -> usize {
            self.inner.lock().resolved_cleared
        }

        pub fn is_dead(&self) -> bool {
            self.inner.lock().dead
        }

        /// Whether a leader-settings subscription is currently open.
        pub fn leader_settings_watched(&self) -> bool {
            self.inner.lock().leader_settings_tx.as_ref().is_some_and(|tx| !tx.is_closed())
        }

        /// How many times leader settings were subscribed to.
        pub fn leader_settings_subscriptions(&self) -> usize {
            self.inner.lock().leader_settings_subscribed
        }
    }

    #[async_trait]
    impl UnitFacade for FakeFacade {
        async fn unit(&self) -> Result<UnitSnapshot, FacadeError> {
            Ok(self.inner.lock().unit.clone())
        }

        async fn bundle_target(&self) -> Result<Option<BundleTarget>, FacadeError> {
            Ok(self.inner.lock().target.clone())
        }

        async fn bundle_info(&self, url: &BundleUrl) -> Result<BundleInfo, FacadeError> {
            self.inner
                .lock()
                .bundles
                .get(url)
                .cloned()
                .ok_or_else(|| FacadeError::NotFound(format!("bundle {url}")))
        }

        async fn relation(&self, id: RelationId) -> Result<RelationInfo, FacadeError> {
            self.inner
                .lock()
                .relations
                .get(&id)
                .cloned()
                .ok_or_else(|| FacadeError::NotFound(format!("relation {id}")))
        }

        async fn set_status(&self, status: AgentStatus, info: &str) -> Result<(), FacadeError> {
            self.inner.lock().statuses.push((status, info.to_string()));
            Ok(())
        }

        async fn set_deployed(&self, url: &BundleUrl) -> Result<(), FacadeError> {
            self.inner.lock().deployed.push(url.clone());
            Ok(())
        }

        async fn clear_resolved(&self) -> Result<(), FacadeError> {
            let mut s = self.inner.lock();
            s.resolved_cleared += 1;
            s.unit.resolved = ResolvedMode::None;
            Ok(())
        }

        async fn ensure_dead(&self) -> Result<(), FacadeError> {
            let mut s = self.inner.lock();
            s.dead = true;
            s.unit.life = Life::Dead;
            Ok(())
        }

        fn watch_unit(&self) -> Watch<UnitSnapshot> {
            let mut s = self.inner.lock();
            let (tx, rx) = open(Some(s.unit.clone()));
            s.unit_tx = Some(tx);
            rx
        }

        fn watch_config(&self) -> Watch<()> {
            let (tx, rx) = open(Some(()));
            self.inner.lock().config_tx = Some(tx);
            rx
        }

        fn watch_bundle(&self) -> Watch<BundleTarget> {
            let mut s = self.inner.lock();
            let (tx, rx) = open(s.target.clone());
            s.bundle_tx = Some(tx);
            rx
        }

        fn watch_relations(&self) -> Watch<Vec<RelationId>> {
            let mut s = self.inner.lock();
            let ids: Vec<RelationId> = s.relations.keys().copied().collect();
            let (tx, rx) = open(if ids.is_empty() { None } else { Some(ids) });
            s.relations_tx = Some(tx);
            rx
        }

        fn watch_relation_units(&self, id: RelationId) -> Watch<RelationUnitsChange> {
            let mut s = self.inner.lock();
            let members = s.members.get(&id).cloned().unwrap_or_default();
            let initial = RelationUnitsChange { relation_id: id, changed: members, departed: vec![] };
            let (tx, rx) = open(if initial.is_empty() { None } else { Some(initial) });
            s.units_tx.insert(id, tx);
            rx
        }

        fn watch_leader_settings(&self) -> Watch<()> {
            let mut s = self.inner.lock();
            let (tx, rx) = open(Some(()));
            s.leader_settings_tx = Some(tx);
            s.leader_settings_subscribed += 1;
            rx
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFacade;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A control plane backed by a JSON model file on the local host.
//!
//! The file is re-read on a fixed poll interval and every subscription is
//! derived from the latest parsed copy. Writes made by the agent (leadership
//! claims, resolution acknowledgements, life changes) go through an atomic
//! replace and are published to subscribers immediately.

use crate::facade::{BundleTarget, FacadeError, UnitFacade, Watch};
use crate::leadership::{LeadershipError, LeadershipTracker};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use ua_core::{
    AgentStatus, BundleInfo, BundleUrl, Life, RelationId, RelationInfo, RelationUnitsChange,
    ResolvedMode, UnitName, UnitSnapshot,
};

const WATCH_CAPACITY: usize = 16;

/// One relation in the model file, with its remote members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRelation {
    #[serde(flatten)]
    pub info: RelationInfo,
    /// Remote unit name to settings version
    #[serde(default)]
    pub members: BTreeMap<UnitName, i64>,
}

/// Contents of the model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDoc {
    pub unit: UnitSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleTarget>,
    #[serde(default)]
    pub bundles: Vec<BundleInfo>,
    #[serde(default)]
    pub config_version: u64,
    #[serde(default)]
    pub relations: Vec<ModelRelation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<UnitName>,
    #[serde(default)]
    pub leader_settings_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed: Option<BundleUrl>,
}

#[derive(Serialize)]
struct StatusRecord<'a> {
    unit: &'a UnitName,
    status: AgentStatus,
    info: &'a str,
}

type Snapshot = Result<Arc<ModelDoc>, FacadeError>;

struct ModelInner {
    path: PathBuf,
    status_path: PathBuf,
    unit: UnitName,
    docs: watch::Sender<Snapshot>,
    leader: watch::Sender<bool>,
    write_lock: Mutex<()>,
}

/// File-backed [`UnitFacade`] and [`LeadershipTracker`].
#[derive(Clone)]
pub struct LocalModel {
    inner: Arc<ModelInner>,
}

fn read_doc(path: &Path) -> Result<ModelDoc, FacadeError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FacadeError::NotFound(format!("model file {}", path.display())));
        }
        Err(e) => return Err(FacadeError::Transport(format!("{}: {e}", path.display()))),
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| FacadeError::Transport(format!("invalid model file {}: {e}", path.display())))
}

impl LocalModel {
    /// Load the model for `unit` and poll it until `cancel` fires.
    pub fn start(
        path: impl Into<PathBuf>,
        status_path: impl Into<PathBuf>,
        unit: UnitName,
        poll: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, FacadeError> {
        let path = path.into();
        let doc = read_doc(&path)?;
        if doc.unit.name != unit {
            return Err(FacadeError::NotFound(format!("unit {unit} in {}", path.display())));
        }
        let is_leader = doc.leader.as_ref() == Some(&unit);
        let (docs, _) = watch::channel(Ok(Arc::new(doc)));
        let (leader, _) = watch::channel(is_leader);
        let model = Self {
            inner: Arc::new(ModelInner {
                path,
                status_path: status_path.into(),
                unit,
                docs,
                leader,
                write_lock: Mutex::new(()),
            }),
        };

        let poller = model.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll) => {}
                }
                poller.refresh();
            }
            tracing::debug!("model poller stopped");
        });
        Ok(model)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Re-read the model file and publish it if it changed.
    pub fn refresh(&self) {
        let next = read_doc(&self.inner.path).map(Arc::new);
        self.publish(next);
    }

    fn publish(&self, next: Snapshot) {
        if let Ok(doc) = &next {
            let leads = doc.leader.as_ref() == Some(&self.inner.unit);
            self.inner.leader.send_if_modified(|cur| std::mem::replace(cur, leads) != leads);
        }
        self.inner.docs.send_if_modified(|cur| {
            let same = match (&*cur, &next) {
                (Ok(a), Ok(b)) => a == b,
                (Err(a), Err(b)) => a == b,
                _ => false,
            };
            if !same {
                *cur = next;
            }
            !same
        });
    }

    fn current(&self) -> Result<Arc<ModelDoc>, FacadeError> {
        self.inner.docs.borrow().clone()
    }

    /// Read-modify-write of the model file.
    fn update(&self, f: impl FnOnce(&mut ModelDoc)) -> Result<Arc<ModelDoc>, FacadeError> {
        let _guard = self.inner.write_lock.lock();
        let mut doc = read_doc(&self.inner.path)?;
        f(&mut doc);
        let json = serde_json::to_vec_pretty(&doc)
            .map_err(|e| FacadeError::Transport(format!("encode model: {e}")))?;
        ua_storage::write_atomic(&self.inner.path, &json)
            .map_err(|e| FacadeError::Transport(format!("write model: {e}")))?;
        let doc = Arc::new(doc);
        self.publish(Ok(Arc::clone(&doc)));
        Ok(doc)
    }

    /// Derive a subscription from the model: `project` picks the watched
    /// part, `diff` turns a previous/current pair into a message.
    fn derive<S, M>(
        &self,
        project: impl Fn(&ModelDoc) -> S + Send + 'static,
        diff: impl Fn(Option<&S>, &S) -> Option<M> + Send + 'static,
    ) -> Watch<M>
    where
        S: Send + 'static,
        M: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(WATCH_CAPACITY);
        let mut docs = self.inner.docs.subscribe();
        tokio::spawn(async move {
            let mut prev: Option<S> = None;
            loop {
                let snapshot = docs.borrow_and_update().clone();
                match snapshot {
                    Ok(doc) => {
                        let cur = project(&doc);
                        if let Some(msg) = diff(prev.as_ref(), &cur) {
                            if tx.send(Ok(msg)).await.is_err() {
                                return;
                            }
                        }
                        prev = Some(cur);
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
                tokio::select! {
                    changed = docs.changed() => {
                        if changed.is_err() {
                            let err = FacadeError::Transport("model closed".into());
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                    }
                    _ = tx.closed() => return,
                }
            }
        });
        rx
    }
}

fn on_change<T: PartialEq + Clone>(prev: Option<&T>, cur: &T) -> Option<T> {
    (prev != Some(cur)).then(|| cur.clone())
}

fn relation_lives(doc: &ModelDoc) -> BTreeMap<RelationId, Life> {
    doc.relations.iter().map(|r| (r.info.id, r.info.life)).collect()
}

fn diff_relations(
    prev: Option<&BTreeMap<RelationId, Life>>,
    cur: &BTreeMap<RelationId, Life>,
) -> Option<Vec<RelationId>> {
    let empty = BTreeMap::new();
    let prev = prev.unwrap_or(&empty);
    let ids: BTreeSet<RelationId> = cur
        .iter()
        .filter(|(id, life)| prev.get(id) != Some(life))
        .map(|(id, _)| *id)
        .chain(prev.keys().filter(|id| !cur.contains_key(id)).copied())
        .collect();
    (!ids.is_empty()).then(|| ids.into_iter().collect())
}

fn diff_members(
    id: RelationId,
    prev: Option<&BTreeMap<UnitName, i64>>,
    cur: &BTreeMap<UnitName, i64>,
) -> Option<RelationUnitsChange> {
    let empty = BTreeMap::new();
    let prev = prev.unwrap_or(&empty);
    let change = RelationUnitsChange {
        relation_id: id,
        changed: cur
            .iter()
            .filter(|(unit, v)| prev.get(*unit) != Some(*v))
            .map(|(u, v)| (u.clone(), *v))
            .collect(),
        departed: prev.keys().filter(|u| !cur.contains_key(*u)).cloned().collect(),
    };
    (!change.is_empty()).then_some(change)
}

#[async_trait]
impl UnitFacade for LocalModel {
    async fn unit(&self) -> Result<UnitSnapshot, FacadeError> {
        Ok(self.current()?.unit.clone())
    }

    async fn bundle_target(&self) -> Result<Option<BundleTarget>, FacadeError> {
        Ok(self.current()?.bundle.clone())
    }

    async fn bundle_info(&self, url: &BundleUrl) -> Result<BundleInfo, FacadeError> {
        self.current()?
            .bundles
            .iter()
            .find(|b| &b.url == url)
            .cloned()
            .ok_or_else(|| FacadeError::NotFound(format!("bundle {url}")))
    }

    async fn relation(&self, id: RelationId) -> Result<RelationInfo, FacadeError> {
        self.current()?
            .relations
            .iter()
            .find(|r| r.info.id == id)
            .map(|r| r.info.clone())
            .ok_or_else(|| FacadeError::NotFound(format!("relation {id}")))
    }

    async fn set_status(&self, status: AgentStatus, info: &str) -> Result<(), FacadeError> {
        let record = StatusRecord { unit: &self.inner.unit, status, info };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| FacadeError::Transport(format!("encode status: {e}")))?;
        ua_storage::write_atomic(&self.inner.status_path, &json)
            .map_err(|e| FacadeError::Transport(format!("write status: {e}")))
    }

    async fn set_deployed(&self, url: &BundleUrl) -> Result<(), FacadeError> {
        self.update(|doc| doc.deployed = Some(url.clone())).map(|_| ())
    }

    async fn clear_resolved(&self) -> Result<(), FacadeError> {
        self.update(|doc| doc.unit.resolved = ResolvedMode::None).map(|_| ())
    }

    async fn ensure_dead(&self) -> Result<(), FacadeError> {
        self.update(|doc| doc.unit.life = Life::Dead).map(|_| ())
    }

    fn watch_unit(&self) -> Watch<UnitSnapshot> {
        self.derive(|doc| doc.unit.clone(), on_change)
    }

    fn watch_config(&self) -> Watch<()> {
        self.derive(|doc| doc.config_version, |p, c| on_change(p, c).map(|_| ()))
    }

    fn watch_bundle(&self) -> Watch<BundleTarget> {
        self.derive(|doc| doc.bundle.clone(), |p, c| on_change(p, c).flatten())
    }

    fn watch_relations(&self) -> Watch<Vec<RelationId>> {
        self.derive(relation_lives, diff_relations)
    }

    fn watch_relation_units(&self, id: RelationId) -> Watch<RelationUnitsChange> {
        self.derive(
            move |doc| {
                doc.relations
                    .iter()
                    .find(|r| r.info.id == id)
                    .map(|r| r.members.clone())
                    .unwrap_or_default()
            },
            move |p, c| diff_members(id, p, c),
        )
    }

    fn watch_leader_settings(&self) -> Watch<()> {
        self.derive(|doc| doc.leader_settings_version, |p, c| on_change(p, c).map(|_| ()))
    }
}

#[async_trait]
impl LeadershipTracker for LocalModel {
    fn is_leader(&self) -> bool {
        *self.inner.leader.borrow()
    }

    async fn claim_leader(&self) -> Result<bool, LeadershipError> {
        let unit = self.inner.unit.clone();
        let doc = self
            .update(|doc| {
                if doc.leader.is_none() {
                    doc.leader = Some(unit);
                }
            })
            .map_err(|e| LeadershipError::Claim(e.to_string()))?;
        Ok(doc.leader.as_ref() == Some(&self.inner.unit))
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.leader.subscribe()
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;

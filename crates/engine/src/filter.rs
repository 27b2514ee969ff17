// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merges the control-plane subscriptions into one ordered event stream.
//!
//! A single task owns every subscription and forwards notifications in the
//! order it receives them. Per-relation unit subscriptions and the
//! leader-settings subscription come and go at the agent's request. If any
//! subscription breaks, the task delivers the error as the last item of the
//! stream and stops.

use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use ua_adapters::{FacadeError, LeadershipTracker, UnitFacade, Watch};
use ua_core::{Event, Life, RelationId, RelationUnitsChange, ResolvedMode, UnitSnapshot};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("{source_name} watcher failed: {error}")]
    Watch { source_name: String, error: FacadeError },
    #[error("{0} watcher closed")]
    Closed(String),
    #[error("event filter stopped")]
    Stopped,
}

impl FilterError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FilterError::Watch { error, .. } if error.is_terminal())
    }
}

#[derive(Debug)]
enum Control {
    WantLeaderSettings(bool),
    AddRelation(RelationId),
    RemoveRelation(RelationId),
}

/// Handle the agent uses to reshape the filter's subscriptions.
#[derive(Debug, Clone)]
pub struct FilterControl {
    tx: mpsc::UnboundedSender<Control>,
}

impl FilterControl {
    /// Forward leader-settings changes only while `want` is true.
    pub fn want_leader_settings(&self, want: bool) {
        let _ = self.tx.send(Control::WantLeaderSettings(want));
    }

    pub fn add_relation(&self, id: RelationId) {
        let _ = self.tx.send(Control::AddRelation(id));
    }

    pub fn remove_relation(&self, id: RelationId) {
        let _ = self.tx.send(Control::RemoveRelation(id));
    }
}

/// Receiving end of the merged stream.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Result<Event, FilterError>>,
}

impl EventStream {
    /// Next event in arrival order. After an error the stream is finished.
    pub async fn next(&mut self) -> Result<Event, FilterError> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Err(FilterError::Stopped),
        }
    }
}

struct RelationWatch {
    cancel: CancellationToken,
}

struct FilterTask<F: UnitFacade, L: LeadershipTracker> {
    facade: F,
    leadership: L,
    out: mpsc::Sender<Result<Event, FilterError>>,
    unit: Option<UnitSnapshot>,
    relations: HashMap<RelationId, RelationWatch>,
    units_tx: mpsc::Sender<Result<RelationUnitsChange, FacadeError>>,
    leader_settings: Option<Watch<()>>,
    cancel: CancellationToken,
}

/// Start the filter task. It runs until `cancel` fires, the stream is
/// dropped, or a subscription breaks.
pub fn spawn_filter<F: UnitFacade, L: LeadershipTracker>(
    facade: F,
    leadership: L,
    cancel: CancellationToken,
) -> (FilterControl, EventStream) {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (out, rx) = mpsc::channel(EVENT_CAPACITY);
    let (units_tx, units_rx) = mpsc::channel(EVENT_CAPACITY);
    let task = FilterTask {
        facade,
        leadership,
        out,
        unit: None,
        relations: HashMap::new(),
        units_tx,
        leader_settings: None,
        cancel,
    };
    tokio::spawn(task.run(control_rx, units_rx));
    (FilterControl { tx: control_tx }, EventStream { rx })
}

async fn recv_optional(watch: &mut Option<Watch<()>>) -> Option<Result<(), FacadeError>> {
    match watch {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl<F: UnitFacade, L: LeadershipTracker> FilterTask<F, L> {
    async fn run(
        mut self,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut units_rx: mpsc::Receiver<Result<RelationUnitsChange, FacadeError>>,
    ) {
        let mut unit_rx = self.facade.watch_unit();
        let mut config_rx = self.facade.watch_config();
        let mut bundle_rx = self.facade.watch_bundle();
        let mut relations_rx = self.facade.watch_relations();
        let mut leader_rx = self.leadership.subscribe();
        leader_rx.borrow_and_update();

        let result = loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ok(()),
                _ = self.out.closed() => break Ok(()),
                Some(cmd) = control.recv() => {
                    self.apply(cmd);
                    Ok(Vec::new())
                }
                item = unit_rx.recv() => watched("unit", item).map(|u| self.unit_changed(u)),
                item = config_rx.recv() => {
                    watched("config", item).map(|()| vec![Event::ConfigChanged])
                }
                item = bundle_rx.recv() => watched("bundle", item).map(|target| {
                    vec![Event::UpgradeRequested { url: target.url, force: target.force }]
                }),
                item = relations_rx.recv() => {
                    watched("relations", item).map(|ids| vec![Event::RelationsChanged { ids }])
                }
                item = units_rx.recv() => watched("relation units", item).map(|change| {
                    if self.relations.contains_key(&change.relation_id) && !change.is_empty() {
                        vec![Event::RelationUnits { change }]
                    } else {
                        Vec::new()
                    }
                }),
                item = recv_optional(&mut self.leader_settings) => {
                    watched("leader settings", item).map(|()| vec![Event::LeaderSettingsChanged])
                }
                changed = leader_rx.changed() => match changed {
                    Ok(()) => {
                        let leader = *leader_rx.borrow_and_update();
                        Ok(vec![Event::LeadershipChanged { leader }])
                    }
                    Err(_) => Err(FilterError::Closed("leadership".into())),
                },
            };
            match step {
                Ok(events) => {
                    for event in events {
                        tracing::debug!(event = %event.log_summary(), "filter event");
                        if self.out.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => break Err(e),
            }
        };

        for (_, watch) in self.relations.drain() {
            watch.cancel.cancel();
        }
        if let Err(e) = result {
            tracing::error!(error = %e, "event filter failed");
            let _ = self.out.send(Err(e)).await;
        }
    }

    fn apply(&mut self, cmd: Control) {
        match cmd {
            Control::WantLeaderSettings(true) => {
                if self.leader_settings.is_none() {
                    tracing::debug!("subscribing to leader settings");
                    self.leader_settings = Some(self.facade.watch_leader_settings());
                }
            }
            Control::WantLeaderSettings(false) => {
                if self.leader_settings.take().is_some() {
                    tracing::debug!("unsubscribed from leader settings");
                }
            }
            Control::AddRelation(id) => {
                if self.relations.contains_key(&id) {
                    return;
                }
                let cancel = self.cancel.child_token();
                let mut rx = self.facade.watch_relation_units(id);
                let tx = self.units_tx.clone();
                let token = cancel.clone();
                tokio::spawn(async move {
                    loop {
                        let item = tokio::select! {
                            _ = token.cancelled() => return,
                            item = rx.recv() => item,
                        };
                        let item = match item {
                            Some(item) => item,
                            None => Err(FacadeError::Transport(format!("relation {id} closed"))),
                        };
                        let failed = item.is_err();
                        if tx.send(item).await.is_err() || failed {
                            return;
                        }
                    }
                });
                self.relations.insert(id, RelationWatch { cancel });
            }
            Control::RemoveRelation(id) => {
                if let Some(watch) = self.relations.remove(&id) {
                    watch.cancel.cancel();
                }
            }
        }
    }

    fn unit_changed(&mut self, unit: UnitSnapshot) -> Vec<Event> {
        let mut events = Vec::new();
        let (prev_life, prev_resolved) = match &self.unit {
            Some(u) => (Some(u.life), u.resolved),
            None => (None, ResolvedMode::None),
        };
        if prev_life != Some(unit.life) && !(prev_life.is_none() && unit.life == Life::Alive) {
            events.push(Event::UnitLife { life: unit.life });
        }
        if unit.resolved != ResolvedMode::None && unit.resolved != prev_resolved {
            events.push(Event::Resolved { mode: unit.resolved });
        }
        self.unit = Some(unit);
        events
    }
}

fn watched<T>(
    source_name: &str,
    item: Option<Result<T, FacadeError>>,
) -> Result<T, FilterError> {
    match item {
        Some(Ok(value)) => Ok(value),
        Some(Err(error)) => Err(FilterError::Watch { source_name: source_name.to_string(), error }),
        None => Err(FilterError::Closed(source_name.to_string())),
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;

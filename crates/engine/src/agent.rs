// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The unit agent loop.
//!
//! One task owns the executor and moves between modes: `Continue` picks and
//! runs the next operation or waits for an event, `HookError` and
//! `Conflicted` hold everything back until an operator resolves them. The
//! loop ends on termination, a reboot request, a fatal error, or shutdown.

use crate::bridge::{BridgeRequest, CommandError, CommandInbox};
use crate::bundles::BundleCache;
use crate::deployer::Deployer;
use crate::executor::{Executor, ExecutorDeps, ExecutorError, Recovery};
use crate::filter::{spawn_filter, EventStream, FilterControl, FilterError};
use crate::hooklock::{HookLock, DEFAULT_LOCK_DELAY};
use crate::operation::{Factory, FactoryError, Operation};
use crate::relations::{Relations, RelationsError};
use crate::status::{Mode, StatusReport};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use ua_adapters::{
    ArchiveSource, BundleTarget, FacadeError, HookContext, HookRunner, LeadershipTracker,
    UnitFacade,
};
use ua_core::{
    AgentStatus, BundleUrl, Clock, Event, HookInfo, HookKind, Interval, Life, RelationId,
    ResolvedMode, UnitName,
};
use ua_storage::{Kind, OperationState, RelationStateDir, StateFile};

pub const DEFAULT_UPDATE_STATUS_PERIOD: Duration = Duration::from_secs(300);
pub const DEFAULT_COLLECT_METRICS_PERIOD: Duration = Duration::from_secs(300);

/// Present in the charm directory when the charm declares metrics
const METRICS_FILE: &str = "metrics.yaml";

/// Conditions that end the agent loop
#[derive(Debug, Error)]
pub enum AgentError {
    /// The unit is gone or the agent lost its credentials; do not restart
    #[error("agent terminated: {0}")]
    Terminate(String),
    #[error("reboot requested")]
    Reboot,
    #[error("agent is dying")]
    Dying,
    #[error(transparent)]
    Executor(ExecutorError),
    #[error(transparent)]
    Filter(FilterError),
    #[error(transparent)]
    Facade(FacadeError),
    #[error(transparent)]
    Relations(#[from] RelationsError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
}

impl From<ExecutorError> for AgentError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::NeedsReboot => AgentError::Reboot,
            ExecutorError::Dying => AgentError::Dying,
            ExecutorError::Facade(e) => e.into(),
            other => AgentError::Executor(other),
        }
    }
}

impl From<FacadeError> for AgentError {
    fn from(e: FacadeError) -> Self {
        if e.is_terminal() {
            AgentError::Terminate(e.to_string())
        } else {
            AgentError::Facade(e)
        }
    }
}

impl From<FilterError> for AgentError {
    fn from(e: FilterError) -> Self {
        if e.is_terminal() {
            AgentError::Terminate(e.to_string())
        } else {
            AgentError::Filter(e)
        }
    }
}

/// Tunables passed in by the daemon
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub unit: UnitName,
    /// Host-wide lock serialising hooks across agents
    pub lock_name: String,
    pub lock_delay: Duration,
    pub update_status_period: Duration,
    /// Only used by charms that declare metrics
    pub collect_metrics_period: Duration,
    /// Extra environment for hooks and commands
    pub hook_env: BTreeMap<String, String>,
}

impl AgentConfig {
    pub fn new(unit: UnitName) -> Self {
        Self {
            unit,
            lock_name: "machine-lock".into(),
            lock_delay: DEFAULT_LOCK_DELAY,
            update_status_period: DEFAULT_UPDATE_STATUS_PERIOD,
            collect_metrics_period: DEFAULT_COLLECT_METRICS_PERIOD,
            hook_env: BTreeMap::new(),
        }
    }
}

/// Where the agent keeps its files
#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub state_file: PathBuf,
    pub relations_dir: PathBuf,
    pub bundles_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub charm_dir: PathBuf,
    pub reboot_flag: PathBuf,
}

/// Collaborators injected into the agent
pub struct AgentDeps<F, L, R, S, D, C> {
    pub facade: F,
    pub leadership: L,
    pub runner: R,
    pub source: S,
    pub deployer: D,
    pub clock: C,
}

enum Wake {
    Event(Event),
    Request(BridgeRequest),
    Tick,
}

pub struct Agent<F, L, R, S, D, C>
where
    F: UnitFacade,
    L: LeadershipTracker,
    R: HookRunner,
    S: ArchiveSource,
    D: Deployer,
    C: Clock,
{
    facade: F,
    clock: C,
    unit: UnitName,
    executor: Executor<F, L, R, S, D>,
    filter: FilterControl,
    events: EventStream,
    inbox: CommandInbox,
    status_tx: watch::Sender<StatusReport>,
    cancel: CancellationToken,
    life: Life,
    target: Option<BundleTarget>,
    /// Leadership as last reported by the tracker
    leader: bool,
    want_settings: Option<bool>,
    config_pending: bool,
    /// The config subscription's initial value has been seen
    config_primed: bool,
    settings_pending: bool,
    departing: bool,
    update_status: Interval,
    collect_metrics: Interval,
    metrics_file: PathBuf,
}

impl<F, L, R, S, D, C> Agent<F, L, R, S, D, C>
where
    F: UnitFacade,
    L: LeadershipTracker,
    R: HookRunner,
    S: ArchiveSource,
    D: Deployer,
    C: Clock,
{
    /// Build the agent and start its event filter. Must be called from
    /// within a tokio runtime.
    pub fn new(
        deps: AgentDeps<F, L, R, S, D, C>,
        paths: &AgentPaths,
        config: AgentConfig,
        inbox: CommandInbox,
        cancel: CancellationToken,
    ) -> Result<Self, AgentError> {
        let relations = Relations::load(RelationStateDir::new(&paths.relations_dir))?;
        let ctx = HookContext {
            unit: config.unit.clone(),
            charm_dir: paths.charm_dir.clone(),
            reboot_flag: paths.reboot_flag.clone(),
            env: config.hook_env.clone(),
        };
        let leader = deps.leadership.is_leader();
        let executor = Executor::new(
            ExecutorDeps {
                facade: deps.facade.clone(),
                leadership: deps.leadership.clone(),
                runner: deps.runner,
                cache: BundleCache::new(&paths.bundles_dir, deps.source),
                deployer: deps.deployer,
                lock: HookLock::new(&paths.lock_dir, config.lock_delay),
            },
            StateFile::new(&paths.state_file),
            relations,
            config.lock_name.clone(),
            ctx,
            cancel.clone(),
        )?;
        let (filter, events) =
            spawn_filter(deps.facade.clone(), deps.leadership, cancel.child_token());
        let report = StatusReport { mode: Mode::Continue, state: executor.state().clone() };
        let (status_tx, _) = watch::channel(report);
        let now = deps.clock.now();
        let update_status = Interval::new(config.update_status_period, now);
        let collect_metrics = Interval::new(config.collect_metrics_period, now);

        Ok(Self {
            facade: deps.facade,
            clock: deps.clock,
            unit: config.unit,
            executor,
            filter,
            events,
            inbox,
            status_tx,
            cancel,
            life: Life::Alive,
            target: None,
            leader,
            want_settings: None,
            config_pending: true,
            config_primed: false,
            settings_pending: false,
            departing: false,
            update_status,
            collect_metrics,
            metrics_file: paths.charm_dir.join(METRICS_FILE),
        })
    }

    /// Follow the agent's mode and operation state.
    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.status_tx.subscribe()
    }

    /// Run until the unit is finished with, a reboot is needed, or the agent
    /// is told to stop. A requested stop returns `Ok`.
    pub async fn run(mut self) -> Result<(), AgentError> {
        tracing::info!(unit = %self.unit, "starting unit agent");
        let result = self.run_modes().await;
        match result {
            Err(AgentError::Dying | AgentError::Filter(FilterError::Stopped))
                if self.cancel.is_cancelled() =>
            {
                tracing::info!(unit = %self.unit, "unit agent stopped");
                Ok(())
            }
            Err(AgentError::Reboot) => {
                tracing::info!(unit = %self.unit, "unit agent stopping for reboot");
                self.executor.reporter().report(AgentStatus::Rebooting, "").await;
                Err(AgentError::Reboot)
            }
            Err(AgentError::Terminate(reason)) => {
                tracing::info!(unit = %self.unit, %reason, "unit agent terminated");
                Err(AgentError::Terminate(reason))
            }
            Err(e) => {
                tracing::error!(unit = %self.unit, error = %e, "unit agent failed");
                self.executor.reporter().report(AgentStatus::Failed, &e.to_string()).await;
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    async fn run_modes(&mut self) -> Result<(), AgentError> {
        self.init().await?;
        let mut mode = Mode::Continue;
        loop {
            tracing::info!(%mode, "entering mode");
            self.publish(&mode);
            mode = match mode {
                Mode::Continue => self.mode_continue().await?,
                Mode::HookError(hook) => self.mode_hook_error(hook).await?,
                Mode::Conflicted(url) => self.mode_conflicted(url).await?,
            };
        }
    }

    async fn init(&mut self) -> Result<(), AgentError> {
        let unit = self.facade.unit().await?;
        if unit.life == Life::Dead {
            return Err(AgentError::Terminate(format!("unit {} is dead", unit.name)));
        }
        self.life = unit.life;
        self.target = self.facade.bundle_target().await?;
        for id in self.executor.relations().ids() {
            self.refresh_relation(id).await?;
        }
        self.sync_leader_settings();
        Ok(())
    }

    fn publish(&self, mode: &Mode) {
        let next = StatusReport { mode: mode.clone(), state: self.executor.state().clone() };
        self.status_tx.send_if_modified(|report| {
            if *report == next {
                return false;
            }
            *report = next;
            true
        });
    }

    /// Watch leader settings exactly while the unit is the recorded leader.
    fn sync_leader_settings(&mut self) {
        let want = self.executor.state().leader;
        if self.want_settings == Some(want) {
            return;
        }
        tracing::info!(want, "leader settings subscription");
        self.filter.want_leader_settings(want);
        self.want_settings = Some(want);
        if !want {
            self.settings_pending = false;
        }
    }

    async fn run_op(&mut self, op: Operation) -> Result<Option<Mode>, AgentError> {
        let result = self.executor.run(op).await;
        self.sync_leader_settings();
        match result {
            Ok(()) => Ok(None),
            Err(ExecutorError::HookFailed(hook)) => Ok(Some(Mode::HookError(hook))),
            Err(ExecutorError::Conflict(url)) => Ok(Some(Mode::Conflicted(url))),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for an event, a request, or `timeout` to pass.
    async fn wait(&mut self, timeout: Option<Duration>) -> Result<Wake, AgentError> {
        let tick = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Dying),
            event = self.events.next() => Ok(Wake::Event(event?)),
            request = self.inbox.recv() => Ok(Wake::Request(request)),
            _ = tick => Ok(Wake::Tick),
        }
    }

    fn metrics_declared(&self) -> bool {
        self.metrics_file.is_file()
    }

    /// Time until the next periodic hook is due.
    fn next_timer(&self) -> Duration {
        let now = self.clock.now();
        let status = self.update_status.remaining(now);
        if self.metrics_declared() {
            status.min(self.collect_metrics.remaining(now))
        } else {
            status
        }
    }

    async fn refresh_relation(&mut self, id: RelationId) -> Result<(), AgentError> {
        match self.facade.relation(id).await {
            Ok(info) => {
                if self.life != Life::Alive && !self.executor.relations().contains(id) {
                    return Ok(());
                }
                let alive = info.life == Life::Alive;
                self.executor.relations_mut().join(&info)?;
                if alive && self.executor.relations().contains(id) {
                    self.filter.add_relation(id);
                } else {
                    self.filter.remove_relation(id);
                }
            }
            Err(FacadeError::NotFound(_)) => {
                if self.executor.relations_mut().gone(id) {
                    self.filter.remove_relation(id);
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Absorb an event. Returns a mode when handling it ran an operation
    /// that needs one.
    async fn handle_event(&mut self, event: Event) -> Result<Option<Mode>, AgentError> {
        tracing::debug!(event = %event.log_summary(), "handling event");
        match event {
            Event::UnitLife { life: Life::Dead } => {
                return Err(AgentError::Terminate(format!("unit {} is dead", self.unit)));
            }
            Event::UnitLife { life } => self.life = life,
            Event::Resolved { mode } => {
                tracing::info!(%mode, "nothing to resolve");
                self.facade.clear_resolved().await?;
            }
            Event::ConfigChanged if !self.config_primed => self.config_primed = true,
            Event::ConfigChanged => self.config_pending = true,
            Event::UpgradeRequested { url, force } => {
                self.target = Some(BundleTarget { url, force });
            }
            Event::RelationsChanged { ids } => {
                for id in ids {
                    self.refresh_relation(id).await?;
                }
            }
            Event::RelationUnits { change } => {
                let op = match Factory::new(self.executor.relations()).new_relation_change(change)
                {
                    Ok(op) => op,
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring relation change");
                        return Ok(None);
                    }
                };
                return self.run_op(op).await;
            }
            Event::LeaderSettingsChanged => self.settings_pending = true,
            Event::LeadershipChanged { leader } => self.leader = leader,
        }
        Ok(None)
    }

    async fn handle_request(&mut self, request: BridgeRequest) -> Result<Option<Mode>, AgentError> {
        match request {
            BridgeRequest::RunCommands { args, respond } => {
                let factory = Factory::new(self.executor.relations());
                if let Err(e) = factory.check_commands(&args) {
                    let _ = respond.send(Err(CommandError::Invalid(e.to_string())));
                    return Ok(None);
                }
                let op = factory.new_commands(args, Some(respond))?;
                self.run_op(op).await
            }
            BridgeRequest::Resolve { respond, .. } => {
                let _ = respond.send(Err(CommandError::Invalid("nothing to resolve".into())));
                Ok(None)
            }
        }
    }

    async fn wake(&mut self, wake: Wake) -> Result<Option<Mode>, AgentError> {
        match wake {
            Wake::Event(event) => self.handle_event(event).await,
            Wake::Request(request) => self.handle_request(request).await,
            Wake::Tick => Ok(None),
        }
    }

    fn hook_op(&self, kind: HookKind) -> Result<Operation, AgentError> {
        Ok(Factory::new(self.executor.relations()).new_run_hook(HookInfo::new(kind))?)
    }

    async fn mode_continue(&mut self) -> Result<Mode, AgentError> {
        loop {
            self.publish(&Mode::Continue);
            let op = match self.executor.recover()? {
                Recovery::Idle => None,
                Recovery::Run(op) => Some(op),
                Recovery::HookError(hook) => return Ok(Mode::HookError(hook)),
                Recovery::Conflicted(url) => return Ok(Mode::Conflicted(url)),
            };
            if let Some(op) = op {
                if let Some(mode) = self.run_op(op).await? {
                    return Ok(mode);
                }
                continue;
            }

            if let Some(op) = self.next_operation().await? {
                let leadership = matches!(
                    &op,
                    Operation::RunHook { hook }
                        if matches!(hook.kind, HookKind::LeaderElected | HookKind::LeaderDeposed)
                );
                if let Some(mode) = self.run_op(op).await? {
                    return Ok(mode);
                }
                // A refused claim leaves the unit a follower until the
                // tracker reports otherwise
                if leadership {
                    self.leader = self.executor.state().leader;
                }
                continue;
            }

            self.executor.reporter().report(AgentStatus::Idle, "").await;
            let timeout = self.next_timer();
            let wake = self.wait(Some(timeout)).await?;
            if let Some(mode) = self.wake(wake).await? {
                return Ok(mode);
            }
        }
    }

    /// Pick the next piece of work when nothing is pending.
    async fn next_operation(&mut self) -> Result<Option<Operation>, AgentError> {
        let state = self.executor.state().clone();
        if self.life != Life::Alive {
            return self.next_dying_operation(&state).await;
        }

        if !state.installed {
            if state.deployed.is_some() {
                return self.hook_op(HookKind::Install).map(Some);
            }
            let factory = Factory::new(self.executor.relations());
            return Ok(self.target.as_ref().map(|t| factory.new_install(t.url.clone())));
        }
        if let Some(target) = &self.target {
            if state.deployed.as_ref() != Some(&target.url) {
                let url = target.url.clone();
                return Ok(Some(Factory::new(self.executor.relations()).new_upgrade(url)));
            }
        }
        if self.leader != state.leader {
            let factory = Factory::new(self.executor.relations());
            return Ok(Some(if self.leader {
                factory.new_accept_leadership()
            } else {
                factory.new_resign_leadership()
            }));
        }
        if self.config_pending {
            self.config_pending = false;
            return self.hook_op(HookKind::ConfigChanged).map(Some);
        }
        if !state.started {
            return self.hook_op(HookKind::Start).map(Some);
        }
        if let Some(op) = self.next_relation_hook()? {
            return Ok(Some(op));
        }
        if std::mem::take(&mut self.settings_pending) && state.leader {
            return self.hook_op(HookKind::LeaderSettingsChanged).map(Some);
        }
        let now = self.clock.now();
        if self.update_status.due(now) {
            self.update_status.reset(now);
            return self.hook_op(HookKind::UpdateStatus).map(Some);
        }
        if self.collect_metrics.due(now) {
            self.collect_metrics.reset(now);
            if self.metrics_declared() {
                return self.hook_op(HookKind::CollectMetrics).map(Some);
            }
        }
        Ok(None)
    }

    /// The next queued relation hook. Hooks that no longer validate are
    /// reported and dropped.
    fn next_relation_hook(&mut self) -> Result<Option<Operation>, AgentError> {
        while let Some(hook) = self.executor.relations().next_hook() {
            match Factory::new(self.executor.relations()).new_run_hook(hook.clone()) {
                Ok(op) => return Ok(Some(op)),
                Err(e) => {
                    tracing::warn!(%hook, error = %e, "dropping relation hook");
                    self.executor.relations_mut().discard(&hook)?;
                }
            }
        }
        Ok(None)
    }

    /// Leave relations, stop, remove, then report the unit dead.
    async fn next_dying_operation(
        &mut self,
        state: &OperationState,
    ) -> Result<Option<Operation>, AgentError> {
        if !self.departing {
            tracing::info!(unit = %self.unit, "unit is dying, leaving relations");
            self.executor.relations_mut().depart_all();
            self.departing = true;
        }
        if let Some(op) = self.next_relation_hook()? {
            return Ok(Some(op));
        }
        if state.started && !state.stopped {
            return self.hook_op(HookKind::Stop).map(Some);
        }
        if state.installed && !state.removed {
            return self.hook_op(HookKind::Remove).map(Some);
        }
        self.facade.ensure_dead().await?;
        Err(AgentError::Terminate(format!("unit {} is dead", self.unit)))
    }

    async fn mode_hook_error(&mut self, hook: HookInfo) -> Result<Mode, AgentError> {
        let name = self.executor.hook_name(&hook);
        self.executor.reporter().report(AgentStatus::Error, &format!("hook failed: {name:?}")).await;
        loop {
            self.publish(&Mode::HookError(hook.clone()));
            let resolved = match self.wait(None).await? {
                Wake::Event(Event::Resolved { mode }) => {
                    self.facade.clear_resolved().await?;
                    mode
                }
                Wake::Request(BridgeRequest::Resolve { mode, respond }) => {
                    let _ = respond.send(Ok(()));
                    mode
                }
                Wake::Event(Event::UpgradeRequested { url, force: true })
                    if self.executor.state().deployed.as_ref() != Some(&url) =>
                {
                    tracing::info!(%url, "forced upgrade out of hook error");
                    self.target = Some(BundleTarget { url: url.clone(), force: true });
                    let op = Factory::new(self.executor.relations()).new_upgrade(url);
                    return Ok(self.run_op(op).await?.unwrap_or(Mode::Continue));
                }
                wake => {
                    if let Some(mode) = self.wake(wake).await? {
                        return Ok(mode);
                    }
                    continue;
                }
            };

            let factory = Factory::new(self.executor.relations());
            let op = match resolved {
                ResolvedMode::None => continue,
                ResolvedMode::RetryHooks => factory.new_retry_hook(hook.clone())?,
                ResolvedMode::NoHooks => factory.new_skip_hook(hook.clone())?,
            };
            tracing::info!(mode = %resolved, %hook, "resolving hook error");
            return Ok(self.run_op(op).await?.unwrap_or(Mode::Continue));
        }
    }

    async fn mode_conflicted(&mut self, url: BundleUrl) -> Result<Mode, AgentError> {
        self.executor
            .reporter()
            .report(AgentStatus::Error, &format!("upgrade to {url} conflicted"))
            .await;
        loop {
            self.publish(&Mode::Conflicted(url.clone()));
            let op = match self.wait(None).await? {
                Wake::Event(Event::Resolved { mode }) => {
                    self.facade.clear_resolved().await?;
                    if mode == ResolvedMode::None {
                        continue;
                    }
                    self.redeploy(url.clone())
                }
                Wake::Request(BridgeRequest::Resolve { respond, .. }) => {
                    let _ = respond.send(Ok(()));
                    self.redeploy(url.clone())
                }
                Wake::Event(Event::UpgradeRequested { url: next, force }) if next != url => {
                    tracing::info!(from = %url, to = %next, "abandoning conflicted upgrade");
                    self.target = Some(BundleTarget { url: next.clone(), force });
                    let factory = Factory::new(self.executor.relations());
                    if self.executor.state().kind == Kind::Install {
                        factory.new_install(next)
                    } else {
                        factory.new_revert_upgrade(next)
                    }
                }
                wake => {
                    if let Some(mode) = self.wake(wake).await? {
                        return Ok(mode);
                    }
                    continue;
                }
            };
            return Ok(self.run_op(op).await?.unwrap_or(Mode::Continue));
        }
    }

    /// Retry the deploy that conflicted.
    fn redeploy(&self, url: BundleUrl) -> Operation {
        let factory = Factory::new(self.executor.relations());
        if self.executor.state().kind == Kind::Install {
            factory.new_install(url)
        } else {
            factory.new_resolved_upgrade(url)
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;

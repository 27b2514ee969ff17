// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation executor
//!
//! Every operation that changes persisted state follows the same path:
//! record intent as `Queued`, acquire what it needs, record `Started`, do
//! the work, record `Done` or `Failed`, then commit side effects and return
//! to `Continue`.

use crate::bridge::{CommandError, CommandResponder};
use crate::bundles::{BundleCache, BundleError};
use crate::deployer::{DeployError, Deployer};
use crate::hooklock::{HookLock, LockError, LockGuard};
use crate::operation::Operation;
use crate::relations::{Relations, RelationsError};
use crate::status::StatusReporter;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use ua_adapters::{
    ArchiveSource, FacadeError, HookContext, HookRunner, LeadershipError, LeadershipTracker,
    UnitFacade,
};
use ua_core::{AgentStatus, BundleUrl, CommandArgs, HookInfo, HookKind};
use ua_storage::{Kind, OperationState, StateError, StateFile, Step};

/// Errors from running an operation
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("upgrade to {0} must finish first")]
    NeedsUpgrade(BundleUrl),
    #[error("hook {0} is already started")]
    AlreadyStarted(HookInfo),
    #[error("hook failed: {0}")]
    HookFailed(HookInfo),
    #[error("reboot requested")]
    NeedsReboot,
    #[error("upgrade to {0} conflicted with deployed contents")]
    Conflict(BundleUrl),
    #[error("agent is dying")]
    Dying,
    #[error(transparent)]
    Bundle(BundleError),
    #[error(transparent)]
    Deploy(DeployError),
    #[error(transparent)]
    Lock(LockError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Relations(#[from] RelationsError),
    #[error(transparent)]
    Facade(#[from] FacadeError),
    #[error(transparent)]
    Leadership(#[from] LeadershipError),
}

impl From<LockError> for ExecutorError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Cancelled(_) => ExecutorError::Dying,
            other => ExecutorError::Lock(other),
        }
    }
}

impl From<BundleError> for ExecutorError {
    fn from(e: BundleError) -> Self {
        if e.is_aborted() {
            ExecutorError::Dying
        } else {
            ExecutorError::Bundle(e)
        }
    }
}

/// What a restart found in the operation state
#[derive(Debug)]
pub enum Recovery {
    /// Nothing pending
    Idle,
    /// Queued or unfinished work to run again
    Run(Operation),
    /// A hook failed or was interrupted mid-run
    HookError(HookInfo),
    /// An upgrade could not be deployed
    Conflicted(BundleUrl),
}

/// Collaborators the executor drives
pub struct ExecutorDeps<F, L, R, S, D> {
    pub facade: F,
    pub leadership: L,
    pub runner: R,
    pub cache: BundleCache<S>,
    pub deployer: D,
    pub lock: HookLock,
}

pub struct Executor<F, L, R, S, D> {
    facade: F,
    reporter: StatusReporter<F>,
    leadership: L,
    runner: R,
    cache: BundleCache<S>,
    deployer: D,
    lock: HookLock,
    lock_name: String,
    ctx: HookContext,
    file: StateFile,
    state: OperationState,
    relations: Relations,
    cancel: CancellationToken,
}

impl<F, L, R, S, D> Executor<F, L, R, S, D>
where
    F: UnitFacade,
    L: LeadershipTracker,
    R: HookRunner,
    S: ArchiveSource,
    D: Deployer,
{
    /// Create an executor resuming from whatever `file` holds.
    pub fn new(
        deps: ExecutorDeps<F, L, R, S, D>,
        file: StateFile,
        relations: Relations,
        lock_name: impl Into<String>,
        ctx: HookContext,
        cancel: CancellationToken,
    ) -> Result<Self, ExecutorError> {
        let state = file.read()?.unwrap_or_default();
        tracing::info!(kind = %state.kind, step = %state.step, "loaded operation state");
        Ok(Self {
            reporter: StatusReporter::new(deps.facade.clone()),
            facade: deps.facade,
            leadership: deps.leadership,
            runner: deps.runner,
            cache: deps.cache,
            deployer: deps.deployer,
            lock: deps.lock,
            lock_name: lock_name.into(),
            ctx,
            file,
            state,
            relations,
            cancel,
        })
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    pub fn reporter(&self) -> &StatusReporter<F> {
        &self.reporter
    }

    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    pub fn relations_mut(&mut self) -> &mut Relations {
        &mut self.relations
    }

    /// File name of the hook script for `hook`
    pub fn hook_name(&self, hook: &HookInfo) -> String {
        if hook.kind.is_relation() {
            self.relations.hook_name(hook)
        } else {
            hook.kind.to_string()
        }
    }

    /// Run a single operation with tracing
    pub async fn run(&mut self, op: Operation) -> Result<(), ExecutorError> {
        let info = op
            .fields()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        let name = op.name();
        tracing::info!("executing operation={} {}", name, info);

        let start = std::time::Instant::now();
        let result = self.run_inner(op).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => tracing::info!(elapsed_ms, "completed operation={} {}", name, info),
            Err(ExecutorError::NeedsReboot) => {
                tracing::info!(elapsed_ms, "reboot requested by operation={} {}", name, info)
            }
            Err(e) => tracing::error!(error = %e, elapsed_ms, "failed operation={} {}", name, info),
        }
        result
    }

    async fn run_inner(&mut self, op: Operation) -> Result<(), ExecutorError> {
        match op {
            Operation::RelationChange { change } => {
                let queued = self.relations.apply_units(&change)?;
                tracing::debug!(relation = %change.relation_id, queued, "queued relation hooks");
                Ok(())
            }
            Operation::RunCommands { args, responder } => {
                self.run_commands(args, responder).await
            }
            Operation::Install { url } => self.deploy(Kind::Install, url).await,
            Operation::Upgrade { url, .. } => self.deploy(Kind::Upgrade, url).await,
            Operation::RunHook { hook } => self.run_hook(hook).await,
            Operation::SkipHook { hook } => {
                self.check_upgrade()?;
                tracing::warn!(%hook, "skipping hook at operator request");
                self.write(OperationState {
                    kind: Kind::RunHook,
                    step: Step::Done,
                    hook: Some(hook.clone()),
                    ..self.state.with_step(Kind::RunHook, Step::Done)
                })?;
                self.commit_hook(&hook, false)
            }
        }
    }

    /// Work out how to continue from the persisted state.
    pub fn recover(&mut self) -> Result<Recovery, ExecutorError> {
        let state = self.state.clone();
        match (state.kind, state.step) {
            (Kind::Continue, _) => Ok(Recovery::Idle),
            (Kind::RunCommands, _) => {
                tracing::warn!(step = %state.step, "abandoning interrupted commands");
                self.write(state.with_step(Kind::Continue, Step::Done))?;
                Ok(Recovery::Idle)
            }
            (Kind::RunHook, step) => {
                let Some(hook) = state.hook else {
                    return Err(StateError::MissingHook(Kind::RunHook).into());
                };
                match step {
                    Step::Queued => Ok(Recovery::Run(Operation::RunHook { hook })),
                    Step::Started => {
                        tracing::warn!(%hook, "hook was interrupted");
                        self.write_step(Step::Failed)?;
                        Ok(Recovery::HookError(hook))
                    }
                    Step::Done => {
                        self.commit_hook(&hook, true)?;
                        self.recover()
                    }
                    Step::Failed => Ok(Recovery::HookError(hook)),
                }
            }
            (kind @ (Kind::Install | Kind::Upgrade), step) => {
                let Some(url) = state.bundle else {
                    return Err(StateError::MissingBundle(kind).into());
                };
                match step {
                    Step::Queued | Step::Started if kind == Kind::Install => {
                        Ok(Recovery::Run(Operation::Install { url }))
                    }
                    Step::Queued | Step::Started => Ok(Recovery::Run(Operation::Upgrade {
                        url,
                        mode: crate::operation::UpgradeMode::Normal,
                    })),
                    Step::Done => {
                        self.commit_deploy(kind, url)?;
                        self.recover()
                    }
                    Step::Failed => Ok(Recovery::Conflicted(url)),
                }
            }
        }
    }

    fn write(&mut self, next: OperationState) -> Result<(), ExecutorError> {
        self.file.write(&next)?;
        self.state = next;
        Ok(())
    }

    fn write_step(&mut self, step: Step) -> Result<(), ExecutorError> {
        let mut next = self.state.clone();
        next.step = step;
        self.write(next)
    }

    fn check_upgrade(&self) -> Result<(), ExecutorError> {
        match (&self.state.kind, &self.state.bundle) {
            (Kind::Upgrade, Some(url)) => Err(ExecutorError::NeedsUpgrade(url.clone())),
            _ => Ok(()),
        }
    }

    async fn acquire_lock(&self) -> Result<LockGuard, ExecutorError> {
        Ok(self.lock.acquire(&self.lock_name, &self.cancel).await?)
    }

    async fn run_hook(&mut self, hook: HookInfo) -> Result<(), ExecutorError> {
        self.check_upgrade()?;
        if self.state.kind == Kind::RunHook
            && self.state.step == Step::Started
            && self.state.hook.as_ref() != Some(&hook)
        {
            return Err(ExecutorError::AlreadyStarted(hook));
        }
        if hook.kind.needs_leadership() && !self.leadership.claim_leader().await? {
            tracing::info!(%hook, "not leader, skipping hook");
            // A resumed record must not be handed back by the next recover()
            if self.state.kind == Kind::RunHook && self.state.hook.as_ref() == Some(&hook) {
                self.write(self.state.with_step(Kind::Continue, Step::Done))?;
            }
            return Ok(());
        }

        let name = self.hook_name(&hook);
        self.write(OperationState {
            hook: Some(hook.clone()),
            ..self.state.with_step(Kind::RunHook, Step::Queued)
        })?;
        self.reporter.report(AgentStatus::Executing, &format!("running {name} hook")).await;

        let guard = self.acquire_lock().await?;
        self.write_step(Step::Started)?;
        let result = self.runner.run_hook(&self.ctx, &name, &hook).await;
        guard.release();

        match result {
            Err(e) => {
                tracing::error!(hook = %name, error = %e, "hook failed");
                self.write_step(Step::Failed)?;
                Err(ExecutorError::HookFailed(hook))
            }
            Ok(outcome) => {
                self.write_step(Step::Done)?;
                self.commit_hook(&hook, false)?;
                if outcome.reboot {
                    return Err(ExecutorError::NeedsReboot);
                }
                Ok(())
            }
        }
    }

    /// Apply the side effects of a completed hook and return to `Continue`.
    ///
    /// When resuming, relation bookkeeping that was already applied before a
    /// crash is tolerated.
    fn commit_hook(&mut self, hook: &HookInfo, resuming: bool) -> Result<(), ExecutorError> {
        let mut next = self.state.with_step(Kind::Continue, Step::Done);
        match hook.kind {
            HookKind::Install => next.installed = true,
            HookKind::Start => next.started = true,
            HookKind::Stop => next.stopped = true,
            HookKind::Remove => next.removed = true,
            HookKind::LeaderElected => next.leader = true,
            HookKind::LeaderDeposed => next.leader = false,
            kind if kind.is_relation() => {
                if let Err(e) = self.relations.commit(hook) {
                    if !resuming {
                        return Err(e.into());
                    }
                    tracing::warn!(%hook, error = %e, "relation state already committed");
                }
            }
            _ => {}
        }
        next.last_hook = Some(hook.clone());
        self.write(next)
    }

    async fn run_commands(
        &mut self,
        args: CommandArgs,
        responder: Option<CommandResponder>,
    ) -> Result<(), ExecutorError> {
        // Commands never overwrite a pending hook or upgrade record
        let track = self.state.is_idle();
        if track {
            self.write(self.state.with_step(Kind::RunCommands, Step::Queued))?;
        }
        let guard = match self.acquire_lock().await {
            Ok(guard) => guard,
            Err(e) => {
                if let Some(tx) = responder {
                    let _ = tx.send(Err(CommandError::Dying));
                }
                return Err(e);
            }
        };
        if track {
            self.write_step(Step::Started)?;
        }
        let result = self.runner.run_commands(&self.ctx, &args).await;
        guard.release();
        if track {
            self.write(self.state.with_step(Kind::Continue, Step::Done))?;
        }

        let reply = result.map_err(|e| CommandError::Failed(e.to_string()));
        if let Ok(resp) = &reply {
            tracing::info!(code = resp.code, "commands finished");
        }
        if let Some(tx) = responder {
            if tx.send(reply).is_err() {
                tracing::warn!("command caller went away before the result");
            }
        }
        Ok(())
    }

    async fn deploy(&mut self, kind: Kind, url: BundleUrl) -> Result<(), ExecutorError> {
        self.write(OperationState {
            bundle: Some(url.clone()),
            ..self.state.with_step(kind, Step::Queued)
        })?;
        self.reporter.report(AgentStatus::Executing, &format!("deploying {url}")).await;

        let info = self.facade.bundle_info(&url).await?;
        let bundle = self.cache.fetch(&info, &self.cancel).await?;
        self.write_step(Step::Started)?;

        match self.deployer.deploy(&bundle).await {
            Ok(()) => {}
            Err(DeployError::Conflict { reason, .. }) => {
                tracing::error!(%url, %reason, "deploy conflicted");
                if kind == Kind::Upgrade {
                    self.write_step(Step::Failed)?;
                }
                return Err(ExecutorError::Conflict(url));
            }
            Err(e) => return Err(ExecutorError::Deploy(e)),
        }
        self.facade.set_deployed(&url).await?;
        self.write_step(Step::Done)?;
        self.commit_deploy(kind, url)
    }

    /// Record the deployed bundle and queue the hook that announces it.
    fn commit_deploy(&mut self, kind: Kind, url: BundleUrl) -> Result<(), ExecutorError> {
        let hook = match kind {
            Kind::Install => HookKind::Install,
            _ => HookKind::UpgradeCharm,
        };
        let mut next = self.state.with_step(Kind::RunHook, Step::Queued);
        next.hook = Some(HookInfo::new(hook));
        next.deployed = Some(url);
        self.write(next)
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bridge::{command_bridge, CommandBridge};
use crate::deployer::FakeDeployer;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use ua_adapters::{FakeArchiveSource, FakeFacade, FakeHookRunner, FakeLeadership};
use ua_core::{BundleInfo, CommandArgs, FakeClock, RelationInfo, RelationScope};
use ua_storage::{RelationState, Step};

const WAIT: Duration = Duration::from_secs(5);
const REL: RelationId = RelationId(0);

struct Harness {
    dir: TempDir,
    facade: FakeFacade,
    leadership: FakeLeadership,
    runner: FakeHookRunner,
    source: FakeArchiveSource,
    deployer: FakeDeployer,
    clock: FakeClock,
    cancel: CancellationToken,
}

struct Running {
    task: JoinHandle<Result<(), AgentError>>,
    status: watch::Receiver<StatusReport>,
    bridge: CommandBridge,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            facade: FakeFacade::new("app/0".parse().unwrap()),
            leadership: FakeLeadership::new(false),
            runner: FakeHookRunner::new(),
            source: FakeArchiveSource::new(),
            deployer: FakeDeployer::new(),
            clock: FakeClock::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn paths(&self) -> AgentPaths {
        let root = self.dir.path();
        AgentPaths {
            state_file: root.join("state/operation.json"),
            relations_dir: root.join("state/relations"),
            bundles_dir: root.join("state/bundles"),
            lock_dir: root.join("locks"),
            charm_dir: root.join("charm"),
            reboot_flag: root.join("reboot"),
        }
    }

    fn state_file(&self) -> StateFile {
        StateFile::new(self.paths().state_file)
    }

    fn bundle(&self, url: &str) -> BundleUrl {
        let url: BundleUrl = url.parse().unwrap();
        let body = format!("archive of {url}");
        let archive = format!("http://store/{}", url.cache_name());
        self.source.serve(&archive, body.clone());
        self.facade.set_bundle(
            BundleInfo {
                url: url.clone(),
                sha256: format!("{:x}", Sha256::digest(body.as_bytes())),
                archive_urls: vec![archive],
            },
            false,
        );
        url
    }

    fn start(&self) -> Running {
        let mut config = AgentConfig::new("app/0".parse().unwrap());
        config.lock_delay = Duration::from_millis(10);
        config.update_status_period = Duration::from_secs(60);
        config.collect_metrics_period = Duration::from_secs(120);
        let (bridge, inbox) = command_bridge(self.cancel.clone());
        let agent = Agent::new(
            AgentDeps {
                facade: self.facade.clone(),
                leadership: self.leadership.clone(),
                runner: self.runner.clone(),
                source: self.source.clone(),
                deployer: self.deployer.clone(),
                clock: self.clock.clone(),
            },
            &self.paths(),
            config,
            inbox,
            self.cancel.clone(),
        )
        .unwrap();
        let status = agent.subscribe();
        Running { task: tokio::spawn(agent.run()), status, bridge }
    }

    fn count(&self, hook: &str) -> usize {
        self.runner.hook_names().iter().filter(|n| *n == hook).count()
    }

    fn ran(&self, hook: &str) -> bool {
        self.count(hook) > 0
    }
}

async fn eventually(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn finished(task: JoinHandle<Result<(), AgentError>>) -> Result<(), AgentError> {
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap()
}

fn relation() -> RelationInfo {
    RelationInfo {
        id: REL,
        key: "app:db mysql:server".into(),
        endpoint: "db".into(),
        interface: "mysql".into(),
        scope: RelationScope::Global,
        life: Life::Alive,
    }
}

fn installed_at(url: &BundleUrl) -> OperationState {
    OperationState {
        installed: true,
        started: true,
        deployed: Some(url.clone()),
        ..OperationState::default()
    }
}

#[tokio::test]
async fn first_start_installs_then_starts() {
    let h = Harness::new();
    h.leadership.set_leader(true);
    let url = h.bundle("cs:app-1");
    let run = h.start();

    eventually(|| h.ran("start") && h.facade.last_status() == Some(AgentStatus::Idle)).await;

    let lifecycle: Vec<_> = h
        .runner
        .hook_names()
        .into_iter()
        .filter(|n| ["install", "leader-elected", "config-changed", "start"].contains(&n.as_str()))
        .collect();
    assert_eq!(lifecycle, vec!["install", "leader-elected", "config-changed", "start"]);
    assert_eq!(h.deployer.deployed(), vec![url.clone()]);
    assert_eq!(h.facade.deployed(), vec![url.clone()]);

    let state = h.state_file().read().unwrap().unwrap();
    assert!(state.installed && state.started && state.leader);
    assert_eq!(state.deployed, Some(url));
    assert_eq!(run.status.borrow().mode, Mode::Continue);

    h.cancel.cancel();
    assert!(finished(run.task).await.is_ok());
}

#[tokio::test]
async fn failed_hook_blocks_until_retried() {
    let h = Harness::new();
    h.runner.fail("start");
    h.bundle("cs:app-1");
    let mut run = h.start();

    let failed = HookInfo::new(HookKind::Start);
    tokio::time::timeout(WAIT, run.status.wait_for(|r| r.mode == Mode::HookError(failed.clone())))
        .await
        .unwrap()
        .unwrap();
    let saved = h.state_file().read().unwrap().unwrap();
    assert_eq!((saved.kind, saved.step), (Kind::RunHook, Step::Failed));
    eventually(|| h.facade.last_status() == Some(AgentStatus::Error)).await;

    let before = h.runner.hook_names().len();
    h.facade.change_config();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.runner.hook_names().len(), before);

    h.runner.heal("start");
    h.facade.set_resolved(ResolvedMode::RetryHooks);
    eventually(|| run.status.borrow().state.started).await;
    eventually(|| h.count("config-changed") == 2).await;
    assert_eq!(h.count("start"), 2);
    assert_eq!(h.facade.resolved_cleared(), 1);

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

#[tokio::test]
async fn operator_can_skip_failed_hook() {
    let h = Harness::new();
    h.runner.fail("start");
    h.bundle("cs:app-1");
    let mut run = h.start();
    tokio::time::timeout(WAIT, run.status.wait_for(|r| matches!(r.mode, Mode::HookError(_))))
        .await
        .unwrap()
        .unwrap();

    run.bridge.resolve(ResolvedMode::NoHooks).await.unwrap();

    eventually(|| {
        let report = run.status.borrow();
        report.state.started && report.mode == Mode::Continue
    })
    .await;
    assert_eq!(h.count("start"), 1);

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

#[tokio::test]
async fn leadership_toggles_leader_settings_subscription() {
    let h = Harness::new();
    h.bundle("cs:app-1");
    let run = h.start();
    eventually(|| h.ran("start") && h.facade.last_status() == Some(AgentStatus::Idle)).await;
    assert!(!h.facade.leader_settings_watched());

    h.leadership.set_leader(true);
    eventually(|| h.ran("leader-elected") && h.facade.leader_settings_watched()).await;
    assert!(h.state_file().read().unwrap().unwrap().leader);

    h.leadership.set_leader(false);
    eventually(|| h.ran("leader-deposed") && !h.facade.leader_settings_watched()).await;
    assert!(!h.state_file().read().unwrap().unwrap().leader);

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

#[tokio::test]
async fn commands_run_through_the_bridge() {
    let h = Harness::new();
    h.bundle("cs:app-1");
    let run = h.start();
    eventually(|| h.ran("start")).await;

    let resp = run.bridge.run_commands(CommandArgs::new("hostname")).await.unwrap();
    assert_eq!((resp.code, resp.stdout.as_str()), (0, "hostname"));

    let mut bad = CommandArgs::new("true");
    bad.relation_id = Some(RelationId(7));
    assert!(matches!(run.bridge.run_commands(bad).await, Err(CommandError::Invalid(_))));
    assert!(matches!(
        run.bridge.resolve(ResolvedMode::RetryHooks).await,
        Err(CommandError::Invalid(_))
    ));

    h.cancel.cancel();
    finished(run.task).await.unwrap();
    assert!(matches!(
        run.bridge.run_commands(CommandArgs::new("true")).await,
        Err(CommandError::Dying)
    ));
}

#[tokio::test]
async fn queued_hook_resumes_exactly_once() {
    let h = Harness::new();
    let url = h.bundle("cs:app-1");
    h.state_file()
        .write(&OperationState {
            kind: Kind::RunHook,
            step: Step::Queued,
            hook: Some(HookInfo::new(HookKind::Start)),
            started: false,
            ..installed_at(&url)
        })
        .unwrap();
    let run = h.start();

    eventually(|| run.status.borrow().state.started).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.count("start"), 1);
    assert!(!h.ran("install"));
    assert!(h.deployer.deployed().is_empty());

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

#[tokio::test]
async fn dying_unit_leaves_relations_and_terminates() {
    let h = Harness::new();
    h.bundle("cs:app-1");
    let run = h.start();
    eventually(|| h.ran("start")).await;

    h.facade.add_relation(relation());
    h.facade.change_unit(REL, "mysql/0".parse().unwrap(), 1);
    eventually(|| h.ran("db-relation-changed")).await;

    h.facade.set_life(Life::Dying);
    let result = finished(run.task).await;

    assert!(matches!(result, Err(AgentError::Terminate(_))));
    let names = h.runner.hook_names();
    assert_eq!(
        names[names.len() - 4..].to_vec(),
        vec!["db-relation-departed", "db-relation-broken", "stop", "remove"]
    );
    assert!(h.facade.is_dead());
}

#[tokio::test]
async fn dead_unit_terminates_without_running_hooks() {
    let h = Harness::new();
    h.bundle("cs:app-1");
    h.facade.set_life(Life::Dead);
    let run = h.start();

    assert!(matches!(finished(run.task).await, Err(AgentError::Terminate(_))));
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn reboot_request_stops_the_agent() {
    let h = Harness::new();
    h.runner.reboot_after("install");
    h.bundle("cs:app-1");
    let run = h.start();

    assert!(matches!(finished(run.task).await, Err(AgentError::Reboot)));
    assert!(h.state_file().read().unwrap().unwrap().installed);
    assert_eq!(h.facade.last_status(), Some(AgentStatus::Rebooting));
    assert!(!h.ran("start"));
}

#[tokio::test]
async fn conflicted_upgrade_waits_for_resolution() {
    let h = Harness::new();
    let old: BundleUrl = "cs:app-1".parse().unwrap();
    h.state_file().write(&installed_at(&old)).unwrap();
    h.deployer.conflict_next(1);
    let new = h.bundle("cs:app-2");
    let mut run = h.start();

    tokio::time::timeout(WAIT, run.status.wait_for(|r| r.mode == Mode::Conflicted(new.clone())))
        .await
        .unwrap()
        .unwrap();
    assert!(!h.ran("upgrade-charm"));

    run.bridge.resolve(ResolvedMode::RetryHooks).await.unwrap();

    eventually(|| h.ran("upgrade-charm")).await;
    assert_eq!(h.deployer.deployed(), vec![new.clone()]);
    assert_eq!(h.state_file().read().unwrap().unwrap().deployed, Some(new));

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

/// Move the injected clock and the paused runtime clock together.
async fn advance(h: &Harness, by: Duration) {
    h.clock.advance(by);
    tokio::time::advance(by).await;
}

#[tokio::test(start_paused = true)]
async fn update_status_runs_when_period_elapses() {
    let h = Harness::new();
    h.bundle("cs:app-1");
    let run = h.start();
    eventually(|| h.ran("start") && h.facade.last_status() == Some(AgentStatus::Idle)).await;
    assert!(!h.ran("update-status"));

    advance(&h, Duration::from_secs(61)).await;

    eventually(|| h.ran("update-status")).await;
    assert_eq!(h.count("update-status"), 1);

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn collect_metrics_runs_only_for_charms_declaring_metrics() {
    let h = Harness::new();
    h.bundle("cs:app-1");
    let run = h.start();
    eventually(|| h.ran("start") && h.facade.last_status() == Some(AgentStatus::Idle)).await;

    advance(&h, Duration::from_secs(121)).await;
    eventually(|| h.ran("update-status") && h.facade.last_status() == Some(AgentStatus::Idle))
        .await;
    assert!(!h.ran("collect-metrics"));

    let charm_dir = h.paths().charm_dir;
    std::fs::create_dir_all(&charm_dir).unwrap();
    std::fs::write(charm_dir.join("metrics.yaml"), "metrics: {}\n").unwrap();
    advance(&h, Duration::from_secs(121)).await;

    eventually(|| h.ran("collect-metrics")).await;
    assert_eq!(h.count("collect-metrics"), 1);

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

#[tokio::test]
async fn queued_leader_elected_with_refused_claim_is_skipped_on_restart() {
    let h = Harness::new();
    h.leadership.set_claimable(false);
    let url = h.bundle("cs:app-1");
    h.state_file()
        .write(&OperationState {
            kind: Kind::RunHook,
            step: Step::Queued,
            hook: Some(HookInfo::new(HookKind::LeaderElected)),
            ..installed_at(&url)
        })
        .unwrap();
    let run = h.start();

    eventually(|| h.ran("config-changed") && h.facade.last_status() == Some(AgentStatus::Idle))
        .await;
    let saved = h.state_file().read().unwrap().unwrap();
    assert_eq!((saved.kind, saved.step), (Kind::Continue, Step::Done));
    assert!(!saved.leader);
    assert!(!h.ran("leader-elected"));
    assert_eq!(h.leadership.claims(), 1);

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

#[tokio::test]
async fn revoked_subscription_terminates_the_agent() {
    let h = Harness::new();
    h.bundle("cs:app-1");
    let run = h.start();
    eventually(|| h.ran("start")).await;

    h.facade.fail_unit_watch(FacadeError::Unauthorized("token revoked".into()));

    assert!(matches!(finished(run.task).await, Err(AgentError::Terminate(_))));
    assert!(!h.cancel.is_cancelled());
}

#[tokio::test]
async fn broken_subscription_ends_the_agent_with_a_filter_error() {
    let h = Harness::new();
    h.bundle("cs:app-1");
    let run = h.start();
    eventually(|| h.ran("start")).await;

    h.facade.fail_unit_watch(FacadeError::Transport("connection reset".into()));

    let result = finished(run.task).await;
    assert!(matches!(result, Err(AgentError::Filter(FilterError::Watch { .. }))));
    assert_eq!(h.facade.last_status(), Some(AgentStatus::Failed));
}

#[tokio::test]
async fn invalid_relation_hook_is_dropped_not_fatal() {
    let h = Harness::new();
    let url = h.bundle("cs:app-1");
    h.state_file().write(&installed_at(&url)).unwrap();
    let states = RelationStateDir::new(h.paths().relations_dir);
    let mut stale = RelationState::new(REL, "db");
    stale.changed_pending = Some("mysql/0".parse().unwrap());
    states.write(&stale).unwrap();
    h.facade.add_relation(relation());
    let run = h.start();

    eventually(|| h.ran("config-changed") && h.facade.last_status() == Some(AgentStatus::Idle))
        .await;
    assert!(!h.ran("db-relation-changed"));
    assert_eq!(states.read_all().unwrap()[&REL].changed_pending, None);
    assert!(!run.task.is_finished());

    h.cancel.cancel();
    finished(run.task).await.unwrap();
}

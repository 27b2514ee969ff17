// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;
use ua_core::{HookKind, RelationId};

fn context(dir: &TempDir) -> HookContext {
    std::fs::create_dir_all(dir.path().join("charm/hooks")).unwrap();
    HookContext {
        unit: "app/0".parse().unwrap(),
        charm_dir: dir.path().join("charm"),
        reboot_flag: dir.path().join("reboot"),
        env: BTreeMap::new(),
    }
}

fn write_hook(ctx: &HookContext, name: &str, body: &str) {
    let path = ctx.charm_dir.join("hooks").join(name);
    std::fs::write(&path, format!("#!/bin/bash\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn missing_hook_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let outcome =
        ProcessRunner::new().run_hook(&ctx, "install", &HookInfo::new(HookKind::Install)).await;
    assert_eq!(outcome, Ok(HookOutcome { ran: false, reboot: false }));
}

#[tokio::test]
async fn hook_sees_relation_environment() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let out = dir.path().join("env.txt");
    write_hook(
        &ctx,
        "db-relation-joined",
        &format!("echo \"$UNIT_NAME $HOOK_NAME $RELATION_ID $REMOTE_UNIT\" > {}", out.display()),
    );
    let hook = HookInfo::relation(
        HookKind::RelationJoined,
        RelationId(3),
        Some("mysql/1".parse().unwrap()),
    );
    let outcome = ProcessRunner::new().run_hook(&ctx, "db-relation-joined", &hook).await.unwrap();
    assert!(outcome.ran);
    let seen = std::fs::read_to_string(out).unwrap();
    assert_eq!(seen.trim(), "app/0 db-relation-joined 3 mysql/1");
}

#[tokio::test]
async fn nonzero_exit_is_a_hook_failure() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    write_hook(&ctx, "start", "exit 3");
    let err = ProcessRunner::new().run_hook(&ctx, "start", &HookInfo::new(HookKind::Start)).await;
    assert_eq!(err, Err(HookError::Failed { hook: "start".into(), code: 3 }));
}

#[tokio::test]
async fn reboot_flag_is_reported_and_cleared() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    write_hook(&ctx, "config-changed", "touch \"$UNIT_REBOOT_FLAG\"");
    let outcome = ProcessRunner::new()
        .run_hook(&ctx, "config-changed", &HookInfo::new(HookKind::ConfigChanged))
        .await
        .unwrap();
    assert!(outcome.reboot);
    assert!(!ctx.reboot_flag.exists());
}

#[tokio::test]
async fn commands_capture_output_and_exit_code() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let args = CommandArgs::new("echo out; echo err >&2; exit 4");
    let resp = ProcessRunner::new().run_commands(&ctx, &args).await.unwrap();
    assert_eq!(resp, ExecResponse { code: 4, stdout: "out\n".into(), stderr: "err\n".into() });
}

#[tokio::test]
async fn command_timeout_kills_the_process() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let runner = ProcessRunner::new().with_command_timeout(Duration::from_millis(100));
    let err = runner.run_commands(&ctx, &CommandArgs::new("sleep 5")).await.unwrap_err();
    assert!(matches!(err, HookError::Start { .. }), "{err:?}");
}

#[yare::parameterized(
    plain = { None, None, None, None },
    relation_only = { Some(4), None, Some("4"), None },
    relation_and_unit = { Some(4), Some("mysql/2"), Some("4"), Some("mysql/2") },
)]
fn environment_carries_relation_context(
    relation: Option<i32>,
    remote: Option<&str>,
    expected_id: Option<&str>,
    expected_unit: Option<&str>,
) {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(&dir);
    ctx.env.insert("UNIT_NAME".into(), "overridden/9".into());
    ctx.env.insert("PROXY".into(), "http://proxy".into());
    let remote: Option<UnitName> = remote.map(|u| u.parse().unwrap());

    let env = ctx.environment(relation.map(RelationId), remote.as_ref());

    assert_eq!(env.get("UNIT_NAME").map(String::as_str), Some("app/0"));
    assert_eq!(env.get("PROXY").map(String::as_str), Some("http://proxy"));
    assert_eq!(env.get("RELATION_ID").map(String::as_str), expected_id);
    assert_eq!(env.get("REMOTE_UNIT").map(String::as_str), expected_unit);
}

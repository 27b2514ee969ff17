// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    ping = { r#"{"type":"Ping"}"#, Request::Ping },
    status = { r#"{"type":"Status"}"#, Request::Status },
    shutdown = { r#"{"type":"Shutdown"}"#, Request::Shutdown },
    retry = { r#"{"type":"Resolve","mode":"retry-hooks"}"#, Request::Resolve { mode: ResolvedMode::RetryHooks } },
    skip = { r#"{"type":"Resolve","mode":"no-hooks"}"#, Request::Resolve { mode: ResolvedMode::NoHooks } },
)]
fn parses_tagged_json(json: &str, expected: Request) {
    let request: Request = serde_json::from_str(json).unwrap();
    assert_eq!(request, expected);
}

#[test]
fn run_commands_defaults_optional_relation_context() {
    let json = r#"{"type":"RunCommands","args":{"commands":"echo hi"}}"#;
    let request: Request = serde_json::from_str(json).unwrap();
    let Request::RunCommands { args } = request else {
        panic!("expected RunCommands");
    };
    assert_eq!(args.commands, "echo hi");
    assert_eq!(args.relation_id, None);
    assert_eq!(args.remote_unit, None);
    assert!(!args.force_remote_unit);
}

#[test]
fn unknown_resolve_mode_is_rejected() {
    let json = r#"{"type":"Resolve","mode":"sometimes"}"#;
    assert!(serde_json::from_str::<Request>(json).is_err());
}

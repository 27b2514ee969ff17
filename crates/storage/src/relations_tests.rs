// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

const REL: RelationId = RelationId(7);

fn unit(name: &str) -> UnitName {
    name.parse().unwrap()
}

fn hook(kind: HookKind, remote: Option<&str>) -> HookInfo {
    HookInfo::relation(kind, REL, remote.map(unit))
}

#[test]
fn joined_then_changed_tracks_membership() {
    let mut state = RelationState::new(REL, "db");
    state.apply(&hook(HookKind::RelationJoined, Some("db/0")).with_version(3)).unwrap();
    assert_eq!(state.changed_pending, Some(unit("db/0")));

    state.apply(&hook(HookKind::RelationChanged, Some("db/0")).with_version(4)).unwrap();
    assert_eq!(state.changed_pending, None);
    assert_eq!(state.members.get(&unit("db/0")), Some(&4));

    state.apply(&hook(HookKind::RelationDeparted, Some("db/0"))).unwrap();
    assert!(state.members.is_empty());
    state.validate(&hook(HookKind::RelationBroken, None)).unwrap();
}

#[yare::parameterized(
    joined_twice      = { &["db/0"], HookKind::RelationJoined,   Some("db/0") },
    changed_stranger  = { &[],       HookKind::RelationChanged,  Some("db/1") },
    departed_stranger = { &["db/0"], HookKind::RelationDeparted, Some("db/1") },
    broken_nonempty   = { &["db/0"], HookKind::RelationBroken,   None },
)]
fn rejects_illegal_hooks(members: &[&str], kind: HookKind, remote: Option<&str>) {
    let mut state = RelationState::new(REL, "db");
    for m in members {
        state.members.insert(unit(m), 0);
    }
    assert!(state.validate(&hook(kind, remote)).is_err());
}

#[test]
fn pending_change_blocks_other_hooks() {
    let mut state = RelationState::new(REL, "db");
    state.apply(&hook(HookKind::RelationJoined, Some("db/0"))).unwrap();
    let err = state.validate(&hook(HookKind::RelationJoined, Some("db/1"))).unwrap_err();
    assert!(matches!(err, RelationStateError::PendingChange { .. }));
}

#[test]
fn rejects_hook_for_other_relation() {
    let state = RelationState::new(REL, "db");
    let other = HookInfo::relation(HookKind::RelationJoined, RelationId(8), Some(unit("db/0")));
    assert!(matches!(state.validate(&other), Err(RelationStateError::WrongRelation { .. })));
}

#[test]
fn dir_round_trips_and_removes() {
    let tmp = tempdir().unwrap();
    let dir = RelationStateDir::new(tmp.path().join("relations"));
    assert!(dir.read_all().unwrap().is_empty());

    let mut state = dir.ensure(REL, "db").unwrap();
    state.apply(&hook(HookKind::RelationJoined, Some("db/0"))).unwrap();
    dir.write(&state).unwrap();
    dir.ensure(RelationId(9), "peer").unwrap();

    let all = dir.read_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all.get(&REL), Some(&state));
    assert_eq!(dir.ensure(REL, "db").unwrap(), state, "ensure keeps existing record");

    dir.remove(REL).unwrap();
    dir.remove(REL).unwrap();
    assert_eq!(dir.read_all().unwrap().len(), 1);
}

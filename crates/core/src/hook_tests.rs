// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn unit(name: &str) -> Option<UnitName> {
    Some(name.parse().unwrap())
}

#[test]
fn plain_hook_is_valid() {
    assert_eq!(HookInfo::new(HookKind::Install).validate(), Ok(()));
}

#[test]
fn plain_hook_rejects_relation() {
    let mut info = HookInfo::new(HookKind::Start);
    info.relation_id = Some(RelationId(1));
    assert_eq!(info.validate(), Err(HookInfoError::UnexpectedRelation(HookKind::Start)));
}

#[yare::parameterized(
    joined_needs_unit   = { HookKind::RelationJoined,   None,             Err(HookInfoError::MissingRemoteUnit(HookKind::RelationJoined)) },
    departed_needs_unit = { HookKind::RelationDeparted, None,             Err(HookInfoError::MissingRemoteUnit(HookKind::RelationDeparted)) },
    changed_without     = { HookKind::RelationChanged,  None,             Ok(()) },
    broken_without      = { HookKind::RelationBroken,   None,             Ok(()) },
    joined_with_unit    = { HookKind::RelationJoined,   unit("mysql/0"),  Ok(()) },
)]
fn relation_hook_validation(
    kind: HookKind,
    remote: Option<UnitName>,
    expected: Result<(), HookInfoError>,
) {
    assert_eq!(HookInfo::relation(kind, RelationId(3), remote).validate(), expected);
}

#[test]
fn relation_hook_requires_relation_id() {
    let info = HookInfo::new(HookKind::RelationChanged);
    assert_eq!(info.validate(), Err(HookInfoError::MissingRelation(HookKind::RelationChanged)));
}

#[test]
fn hook_info_display() {
    let info = HookInfo::relation(HookKind::RelationJoined, RelationId(2), unit("mysql/1"));
    assert_eq!(info.to_string(), "relation-joined (relation 2, unit mysql/1)");
    assert_eq!(HookInfo::new(HookKind::ConfigChanged).to_string(), "config-changed");
}

#[test]
fn hook_kind_serde_matches_display() {
    for kind in [
        HookKind::LeaderSettingsChanged,
        HookKind::UpgradeCharm,
        HookKind::CollectMetrics,
        HookKind::RelationBroken,
    ] {
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, format!("\"{kind}\""));
    }
}

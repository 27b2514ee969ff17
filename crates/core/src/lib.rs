// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ua-core: domain vocabulary shared by the unit agent crates

pub mod macros;

pub mod bundle;
pub mod clock;
pub mod event;
pub mod exec;
pub mod hook;
pub mod relation;
pub mod unit;

pub use bundle::{BundleInfo, BundleUrl, BundleUrlError};
pub use clock::{Clock, FakeClock, Interval, SystemClock};
pub use event::Event;
pub use exec::{CommandArgs, ExecResponse};
pub use hook::{HookInfo, HookInfoError, HookKind};
pub use relation::{RelationId, RelationInfo, RelationScope, RelationUnitsChange};
pub use unit::{AgentStatus, Life, ResolvedMode, UnitName, UnitNameError, UnitSnapshot};

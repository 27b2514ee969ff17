// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable local state for the unit agent.
//!
//! Everything here is owned by a single agent process and written with
//! replace-by-rename so a crash never leaves a torn record behind.

mod atomic;
mod operation;
mod relations;

pub use atomic::write_atomic;
pub use operation::{Kind, OperationState, StateError, StateFile, Step};
pub use relations::{RelationState, RelationStateDir, RelationStateError};

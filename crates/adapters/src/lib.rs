// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Collaborators of the unit agent: the control-plane facade, leadership,
//! hook processes and bundle archive sources.

pub mod facade;
pub mod hooks;
pub mod leadership;
pub mod model;
pub mod source;
pub mod subprocess;

pub use facade::{BundleTarget, FacadeError, UnitFacade, Watch};
pub use hooks::{HookContext, HookError, HookOutcome, HookRunner, ProcessRunner};
pub use leadership::{LeadershipError, LeadershipTracker};
pub use model::{LocalModel, ModelDoc, ModelRelation};
pub use source::{ArchiveSource, ByteStream, HttpSource, SourceError};

#[cfg(any(test, feature = "test-support"))]
pub use facade::FakeFacade;
#[cfg(any(test, feature = "test-support"))]
pub use hooks::{FakeHookRunner, HookCall};
#[cfg(any(test, feature = "test-support"))]
pub use leadership::FakeLeadership;
#[cfg(any(test, feature = "test-support"))]
pub use source::FakeArchiveSource;

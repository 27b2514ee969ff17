// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The unit agent: event filtering, operation execution and the mode loop
//! that ties them together.

pub mod agent;
pub mod bridge;
pub mod bundles;
pub mod deployer;
pub mod executor;
pub mod filter;
pub mod hooklock;
pub mod operation;
pub mod relations;
pub mod status;
pub mod supervisor;

pub use agent::{
    Agent, AgentConfig, AgentDeps, AgentError, AgentPaths, DEFAULT_COLLECT_METRICS_PERIOD,
    DEFAULT_UPDATE_STATUS_PERIOD,
};
pub use bridge::{command_bridge, BridgeRequest, CommandBridge, CommandError, CommandInbox};
pub use bundles::{clear_downloads, BundleCache, BundleError, DownloadCause, LocalBundle};
pub use deployer::{ArchiveDeployer, DeployError, Deployer};
pub use executor::{Executor, ExecutorDeps, ExecutorError, Recovery};
pub use filter::{spawn_filter, EventStream, FilterControl, FilterError};
pub use hooklock::{HookLock, LockError, LockGuard, DEFAULT_LOCK_DELAY};
pub use operation::{Factory, FactoryError, Operation, UpgradeMode};
pub use relations::{Relations, RelationsError};
pub use status::{Mode, StatusReport, StatusReporter};
pub use supervisor::{TaskError, TaskGroup};

#[cfg(any(test, feature = "test-support"))]
pub use deployer::FakeDeployer;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations: discrete units of work built by the [`Factory`] and run by
//! the executor.

use crate::bridge::CommandResponder;
use crate::relations::{Relations, RelationsError};
use thiserror::Error;
use ua_core::{BundleUrl, CommandArgs, HookInfo, HookInfoError, HookKind, RelationUnitsChange};

/// How an upgrade came about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeMode {
    /// The application asked for a new bundle
    Normal,
    /// Retry after the operator resolved a conflict
    Resolved,
    /// Abandon a conflicted upgrade in favour of a different bundle
    Revert,
}

ua_core::simple_display! {
    UpgradeMode {
        Normal => "normal",
        Resolved => "resolved",
        Revert => "revert",
    }
}

/// A unit of work for the executor
#[derive(Debug)]
pub enum Operation {
    /// Deploy the first bundle, then queue the install hook
    Install { url: BundleUrl },
    /// Deploy a replacement bundle, then queue upgrade-charm
    Upgrade { url: BundleUrl, mode: UpgradeMode },
    RunHook { hook: HookInfo },
    /// Commit a failed hook as if it had succeeded
    SkipHook { hook: HookInfo },
    RunCommands { args: CommandArgs, responder: Option<CommandResponder> },
    /// Queue hooks for a relation membership delta
    RelationChange { change: RelationUnitsChange },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Install { .. } => "install",
            Operation::Upgrade { .. } => "upgrade",
            Operation::RunHook { .. } => "run-hook",
            Operation::SkipHook { .. } => "skip-hook",
            Operation::RunCommands { .. } => "run-commands",
            Operation::RelationChange { .. } => "relation-change",
        }
    }

    /// Key/value pairs for log lines
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Operation::Install { url } => vec![("url", url.to_string())],
            Operation::Upgrade { url, mode } => {
                vec![("url", url.to_string()), ("mode", mode.to_string())]
            }
            Operation::RunHook { hook } | Operation::SkipHook { hook } => {
                vec![("hook", hook.to_string())]
            }
            Operation::RunCommands { args, .. } => vec![("commands", args.commands.clone())],
            Operation::RelationChange { change } => vec![
                ("relation", change.relation_id.to_string()),
                ("changed", change.changed.len().to_string()),
                ("departed", change.departed.len().to_string()),
            ],
        }
    }
}

/// Reasons an operation could not be built. Never fatal to the agent.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error(transparent)]
    Hook(#[from] HookInfoError),
    #[error(transparent)]
    Relation(#[from] RelationsError),
    #[error("unit {unit} is not a member of relation {relation_id}")]
    NotMember { relation_id: ua_core::RelationId, unit: ua_core::UnitName },
}

/// Builds validated operations against the current relation view.
pub struct Factory<'a> {
    relations: &'a Relations,
}

impl<'a> Factory<'a> {
    pub fn new(relations: &'a Relations) -> Self {
        Self { relations }
    }

    pub fn new_install(&self, url: BundleUrl) -> Operation {
        Operation::Install { url }
    }

    pub fn new_upgrade(&self, url: BundleUrl) -> Operation {
        Operation::Upgrade { url, mode: UpgradeMode::Normal }
    }

    pub fn new_resolved_upgrade(&self, url: BundleUrl) -> Operation {
        Operation::Upgrade { url, mode: UpgradeMode::Resolved }
    }

    pub fn new_revert_upgrade(&self, url: BundleUrl) -> Operation {
        Operation::Upgrade { url, mode: UpgradeMode::Revert }
    }

    pub fn new_run_hook(&self, hook: HookInfo) -> Result<Operation, FactoryError> {
        self.check_hook(&hook)?;
        Ok(Operation::RunHook { hook })
    }

    pub fn new_retry_hook(&self, hook: HookInfo) -> Result<Operation, FactoryError> {
        self.new_run_hook(hook)
    }

    pub fn new_skip_hook(&self, hook: HookInfo) -> Result<Operation, FactoryError> {
        self.check_hook(&hook)?;
        Ok(Operation::SkipHook { hook })
    }

    pub fn new_accept_leadership(&self) -> Operation {
        Operation::RunHook { hook: HookInfo::new(HookKind::LeaderElected) }
    }

    pub fn new_resign_leadership(&self) -> Operation {
        Operation::RunHook { hook: HookInfo::new(HookKind::LeaderDeposed) }
    }

    /// Commands with a relation context must name a known relation and,
    /// unless forced, a current member of it.
    pub fn new_commands(
        &self,
        args: CommandArgs,
        responder: Option<CommandResponder>,
    ) -> Result<Operation, FactoryError> {
        self.check_commands(&args)?;
        Ok(Operation::RunCommands { args, responder })
    }

    pub fn check_commands(&self, args: &CommandArgs) -> Result<(), FactoryError> {
        let Some(id) = args.relation_id else {
            return Ok(());
        };
        if args.force_remote_unit {
            return Ok(());
        }
        if !self.relations.contains(id) {
            return Err(RelationsError::UnknownRelation(id).into());
        }
        match &args.remote_unit {
            Some(unit) if !self.relations.is_member(id, unit) => {
                Err(FactoryError::NotMember { relation_id: id, unit: unit.clone() })
            }
            _ => Ok(()),
        }
    }

    pub fn new_relation_change(
        &self,
        change: RelationUnitsChange,
    ) -> Result<Operation, FactoryError> {
        if !self.relations.contains(change.relation_id) {
            return Err(RelationsError::UnknownRelation(change.relation_id).into());
        }
        Ok(Operation::RelationChange { change })
    }

    fn check_hook(&self, hook: &HookInfo) -> Result<(), FactoryError> {
        hook.validate()?;
        if hook.kind.is_relation() {
            self.relations.validate(hook)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;

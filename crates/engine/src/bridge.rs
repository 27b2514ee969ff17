// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hands external requests to the agent loop and carries answers back.
//!
//! Callers on any task enqueue a request with a one-shot reply channel; the
//! agent loop consumes requests between operations. Once the agent is dying
//! every pending and future call fails with [`CommandError::Dying`].

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use ua_core::{CommandArgs, ExecResponse, ResolvedMode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("agent is dying")]
    Dying,
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("command failed: {0}")]
    Failed(String),
}

pub type CommandResponder = oneshot::Sender<Result<ExecResponse, CommandError>>;

/// A request waiting for the agent loop
#[derive(Debug)]
pub enum BridgeRequest {
    RunCommands { args: CommandArgs, respond: CommandResponder },
    /// Operator resolution of a hook error or upgrade conflict
    Resolve { mode: ResolvedMode, respond: oneshot::Sender<Result<(), CommandError>> },
}

/// Caller side of the bridge; cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandBridge {
    tx: mpsc::Sender<BridgeRequest>,
    cancel: CancellationToken,
}

/// Agent side of the bridge.
#[derive(Debug)]
pub struct CommandInbox {
    rx: mpsc::Receiver<BridgeRequest>,
}

impl CommandInbox {
    /// Next request. Pending forever once every caller handle is gone.
    pub async fn recv(&mut self) -> BridgeRequest {
        match self.rx.recv().await {
            Some(req) => req,
            None => std::future::pending().await,
        }
    }
}

/// Create a bridge whose calls fail once `cancel` fires.
pub fn command_bridge(cancel: CancellationToken) -> (CommandBridge, CommandInbox) {
    let (tx, rx) = mpsc::channel(1);
    (CommandBridge { tx, cancel }, CommandInbox { rx })
}

impl CommandBridge {
    async fn call<T>(
        &self,
        request: BridgeRequest,
        reply: oneshot::Receiver<Result<T, CommandError>>,
    ) -> Result<T, CommandError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(CommandError::Dying),
            sent = self.tx.send(request) => sent.map_err(|_| CommandError::Dying)?,
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CommandError::Dying),
            answer = reply => answer.unwrap_or(Err(CommandError::Dying)),
        }
    }

    /// Run `args` in the agent's hook context and wait for the result.
    pub async fn run_commands(&self, args: CommandArgs) -> Result<ExecResponse, CommandError> {
        let (respond, reply) = oneshot::channel();
        self.call(BridgeRequest::RunCommands { args, respond }, reply).await
    }

    pub async fn resolve(&self, mode: ResolvedMode) -> Result<(), CommandError> {
        let (respond, reply) = oneshot::channel();
        self.call(BridgeRequest::Resolve { mode, respond }, reply).await
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;

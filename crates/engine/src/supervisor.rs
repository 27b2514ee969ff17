// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised task group.
//!
//! Every task shares one cancellation token. The first task to finish, for
//! any reason, cancels the rest; [`TaskGroup::wait`] then joins them all and
//! returns the first failure.

use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TaskError<E> {
    #[error("task {name} failed: {error}")]
    Failed { name: &'static str, error: E },
    #[error("task {name} panicked: {message}")]
    Panicked { name: &'static str, message: String },
}

pub struct TaskGroup<E> {
    cancel: CancellationToken,
    tasks: JoinSet<Result<(), E>>,
    names: HashMap<Id, &'static str>,
}

impl<E> TaskGroup<E>
where
    E: std::fmt::Display + Send + 'static,
{
    /// A group cancelled along with `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self { cancel: parent.child_token(), tasks: JoinSet::new(), names: HashMap::new() }
    }

    /// Token that fires when the group shuts down.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<Fut>(&mut self, name: &'static str, task: Fut)
    where
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        tracing::debug!(task = name, "starting task");
        let handle = self.tasks.spawn(task);
        self.names.insert(handle.id(), name);
    }

    /// Wait for every task. The first one to end stops the others.
    pub async fn wait(mut self) -> Result<(), TaskError<E>> {
        let mut first = None;
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.cancel.cancel();
            let failure = match joined {
                Ok((id, Ok(()))) => {
                    tracing::debug!(task = self.name(id), "task finished");
                    continue;
                }
                Ok((id, Err(error))) => {
                    let name = self.name(id);
                    tracing::debug!(task = name, %error, "task failed");
                    TaskError::Failed { name, error }
                }
                Err(e) => {
                    let name = self.name(e.id());
                    tracing::error!(task = name, error = %e, "task panicked");
                    TaskError::Panicked { name, message: e.to_string() }
                }
            };
            first.get_or_insert(failure);
        }
        match first {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn name(&self, id: Id) -> &'static str {
        self.names.get(&id).copied().unwrap_or("unknown")
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn first_failure_cancels_siblings_and_is_returned() {
    let parent = CancellationToken::new();
    let mut group = TaskGroup::<String>::new(&parent);
    let token = group.token();
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);

    group.spawn("waiter", async move {
        token.cancelled().await;
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });
    group.spawn("failer", async { Err("boom".to_string()) });

    let err = tokio::time::timeout(Duration::from_secs(2), group.wait()).await.unwrap();
    assert!(matches!(err, Err(TaskError::Failed { name: "failer", ref error }) if error == "boom"));
    assert!(stopped.load(Ordering::SeqCst));
    assert!(!parent.is_cancelled());
}

#[tokio::test]
async fn parent_cancellation_stops_the_group_cleanly() {
    let parent = CancellationToken::new();
    let mut group = TaskGroup::<String>::new(&parent);
    for name in ["a", "b"] {
        let token = group.token();
        group.spawn(name, async move {
            token.cancelled().await;
            Ok(())
        });
    }

    parent.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), group.wait()).await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn later_failures_do_not_replace_the_first() {
    let parent = CancellationToken::new();
    let mut group = TaskGroup::<String>::new(&parent);
    let token = group.token();
    group.spawn("first", async { Err("first".to_string()) });
    group.spawn("second", async move {
        token.cancelled().await;
        Err("second".to_string())
    });

    let err = group.wait().await.unwrap_err();
    assert_eq!(err.to_string(), "task first failed: first");
}

#[tokio::test]
async fn panicking_task_is_reported_by_name() {
    let parent = CancellationToken::new();
    let mut group = TaskGroup::<String>::new(&parent);
    group.spawn("doomed", async {
        if true {
            panic!("exploded");
        }
        Ok(())
    });

    let err = group.wait().await.unwrap_err();
    assert!(matches!(err, TaskError::Panicked { name: "doomed", .. }), "{err}");
}

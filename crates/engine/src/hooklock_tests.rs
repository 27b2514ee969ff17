// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn lock(dir: &TempDir) -> HookLock {
    HookLock::new(dir.path().join("locks"), Duration::from_millis(10))
}

#[tokio::test]
async fn second_acquire_waits_for_release() {
    let dir = TempDir::new().unwrap();
    let lock = lock(&dir);
    let cancel = CancellationToken::new();

    let first = lock.acquire("hooks", &cancel).await.unwrap();
    let waiter = {
        let lock = lock.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { lock.acquire("hooks", &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!waiter.is_finished(), "second holder must wait");

    first.release();
    let second = tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
    assert_eq!(second.unwrap().name(), "hooks");
}

#[tokio::test]
async fn holders_never_overlap() {
    let dir = TempDir::new().unwrap();
    let lock = lock(&dir);
    let cancel = CancellationToken::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let max = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let (lock, cancel, inside, max) =
                (lock.clone(), cancel.clone(), inside.clone(), max.clone());
            tokio::spawn(async move {
                for _ in 0..3 {
                    let guard = lock.acquire("hooks", &cancel).await.unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(max.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancel_stops_waiting() {
    let dir = TempDir::new().unwrap();
    let lock = lock(&dir);
    let _held = lock.acquire("hooks", &CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    let waiter = {
        let (lock, cancel) = (lock.clone(), cancel.clone());
        tokio::spawn(async move { lock.acquire("hooks", &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(LockError::Cancelled(name)) if name == "hooks"));
}

#[tokio::test]
async fn cancelled_token_never_acquires() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(lock(&dir).acquire("hooks", &cancel).await, Err(LockError::Cancelled(_))));
}

#[tokio::test]
async fn different_names_do_not_contend() {
    let dir = TempDir::new().unwrap();
    let lock = lock(&dir);
    let cancel = CancellationToken::new();
    let _a = lock.acquire("a", &cancel).await.unwrap();
    let b = tokio::time::timeout(Duration::from_millis(200), lock.acquire("b", &cancel)).await;
    assert!(b.unwrap().is_ok());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};

use super::super::test_helpers::*;
use super::super::LifecycleError;

#[tokio::test]
async fn startup_lock_failed_does_not_remove_existing_files() {
    // Simulate a running daemon by holding the lock and creating its files.
    // A second startup attempt must fail without deleting anything.
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.settings.data_dir).unwrap();
    std::fs::write(&config.socket_path, b"").unwrap();

    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)
        .unwrap();
    use fs2::FileExt;
    lock_file.lock_exclusive().unwrap();
    std::fs::write(&config.lock_path, b"12345").unwrap();

    match super::startup(&config).await {
        Err(LifecycleError::LockFailed(_)) => {}
        Err(e) => panic!("expected LockFailed, got: {e}"),
        Ok(_) => panic!("expected LockFailed, but startup succeeded"),
    }

    assert!(config.socket_path.exists(), "socket file must not be deleted on LockFailed");
    assert!(config.lock_path.exists(), "lock file must not be deleted on LockFailed");
    assert_eq!(std::fs::read_to_string(&config.lock_path).unwrap(), "12345");
}

#[test]
fn lock_file_not_truncated_before_lock_acquired() {
    let dir = tempdir().unwrap();
    let lock_path = dir.path().join("test.lock");

    let running_lock = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .unwrap();
    use fs2::FileExt;
    running_lock.lock_exclusive().unwrap();
    let mut f = &running_lock;
    writeln!(f, "99999").unwrap();

    let _second = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .unwrap();

    let content = std::fs::read_to_string(&lock_path).unwrap();
    assert_eq!(content.trim(), "99999", "lock file content must not be truncated by another open");
}

#[tokio::test]
async fn startup_writes_pid_and_lays_out_directories() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());

    let _started = super::startup(&config).await.unwrap();

    let pid = std::fs::read_to_string(&config.lock_path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
    for path in [
        &config.relations_dir,
        &config.bundles_dir,
        &config.deployer_dir,
        &config.charm_dir,
        &config.settings.lock_dir,
    ] {
        assert!(path.is_dir(), "{} should exist", path.display());
    }
}

#[tokio::test]
async fn socket_is_world_writable() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());

    let _started = super::startup(&config).await.unwrap();

    let mode = std::fs::metadata(&config.socket_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o777);
}

#[tokio::test]
async fn stale_socket_and_partial_downloads_are_removed() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let downloads = config.bundles_dir.join("downloads");
    std::fs::create_dir_all(&downloads).unwrap();
    std::fs::write(downloads.join("partial"), b"half a bundle").unwrap();
    std::fs::write(&config.socket_path, b"stale").unwrap();

    let _started = super::startup(&config).await.unwrap();

    assert!(!downloads.join("partial").exists());
    assert!(std::fs::metadata(&config.socket_path).unwrap().file_type().is_socket());
}

#[test]
fn cleanup_on_failure_removes_created_files() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.settings.data_dir).unwrap();
    std::fs::write(&config.socket_path, b"").unwrap();
    std::fs::write(&config.lock_path, b"12345").unwrap();

    super::cleanup_on_failure(&config);

    assert!(!config.socket_path.exists(), "socket should be cleaned up on non-lock failure");
    assert!(!config.lock_path.exists(), "lock file should be cleaned up on non-lock failure");
}

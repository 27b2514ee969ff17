// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

fn build_archive(path: &Path, files: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn bundle(path: PathBuf, url: &str) -> LocalBundle {
    LocalBundle { url: url.parse().unwrap(), sha256: "unused".into(), path }
}

#[tokio::test]
async fn deploy_replaces_previous_contents() {
    let dir = TempDir::new().unwrap();
    let charm = dir.path().join("charm");
    let deployer = ArchiveDeployer::new(&charm, dir.path().join("deployer"));

    let v1 = dir.path().join("v1.tgz");
    build_archive(&v1, &[("hooks/install", "#!/bin/sh\n"), ("old.txt", "old")]);
    deployer.deploy(&bundle(v1, "cs:app-1")).await.unwrap();
    assert!(charm.join("hooks/install").is_file());
    assert!(charm.join("old.txt").is_file());

    let v2 = dir.path().join("v2.tgz");
    build_archive(&v2, &[("hooks/install", "#!/bin/sh\n"), ("new.txt", "new")]);
    deployer.deploy(&bundle(v2, "cs:app-2")).await.unwrap();
    assert!(charm.join("new.txt").is_file());
    assert!(!charm.join("old.txt").exists());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("deployer")).unwrap().collect();
    assert!(leftovers.is_empty(), "work dir should be empty after a deploy");
}

#[tokio::test]
async fn corrupt_archive_leaves_charm_dir_alone() {
    let dir = TempDir::new().unwrap();
    let charm = dir.path().join("charm");
    std::fs::create_dir_all(&charm).unwrap();
    std::fs::write(charm.join("keep.txt"), "keep").unwrap();

    let bad = dir.path().join("bad.tgz");
    std::fs::write(&bad, b"not a tarball").unwrap();
    let deployer = ArchiveDeployer::new(&charm, dir.path().join("deployer"));
    let err = deployer.deploy(&bundle(bad, "cs:app-3")).await.unwrap_err();

    assert!(matches!(err, DeployError::Archive { .. }));
    assert!(charm.join("keep.txt").is_file());
}

//! Replacement engine integration tests: copy/link installs, rollback after a
//! failed copy, rollback idempotence.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use assert_fs::prelude::*;
use molt_core::ReplaceMode;
use molt_swap::{backup_path, replace, Rollback, SwapError};
use predicates::prelude::*;
use rstest::rstest;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mode_of(path: &std::path::Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

// ---------------------------------------------------------------------------
// 1. Successful swaps
// ---------------------------------------------------------------------------

#[test]
fn copy_mode_installs_byte_identical_executable() {
    init_logging();
    let dir = assert_fs::TempDir::new().unwrap();
    let exe = dir.child("app");
    exe.write_binary(b"old-build").unwrap();
    let candidate = dir.child("download/2024-3-7-14-05-09");
    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024 + 17).collect();
    candidate.write_binary(&payload).unwrap();

    let swapped = replace(exe.path(), candidate.path(), ReplaceMode::Copy).expect("replace");

    assert_eq!(fs::read(exe.path()).unwrap(), payload);
    assert_eq!(mode_of(exe.path()) & 0o111, 0o111, "all execute bits set");
    assert!(!fs::symlink_metadata(exe.path())
        .unwrap()
        .file_type()
        .is_symlink());
    dir.child("app.bak").assert(predicate::path::exists());
    dir.child("app.bak").assert("old-build");
    assert_eq!(swapped.mode, ReplaceMode::Copy);
}

#[test]
fn link_mode_points_executable_at_candidate() {
    init_logging();
    let dir = assert_fs::TempDir::new().unwrap();
    let exe = dir.child("app");
    exe.write_str("old").unwrap();
    let candidate = dir.child("download/build");
    candidate.write_str("new").unwrap();

    replace(exe.path(), candidate.path(), ReplaceMode::Link).expect("replace");

    let meta = fs::symlink_metadata(exe.path()).unwrap();
    assert!(meta.file_type().is_symlink());
    let target = fs::read_link(exe.path()).unwrap();
    assert!(target.is_absolute(), "link target must be absolute: {target:?}");
    assert_eq!(fs::canonicalize(&target).unwrap(), fs::canonicalize(candidate.path()).unwrap());
    exe.assert("new");
    candidate.assert(predicate::path::exists());
}

// ---------------------------------------------------------------------------
// 2. Failure after backup, then rollback
// ---------------------------------------------------------------------------

#[rstest]
#[case(ReplaceMode::Copy)]
#[case(ReplaceMode::Link)]
fn failed_install_is_undone_by_rollback(#[case] mode: ReplaceMode) {
    init_logging();
    let dir = assert_fs::TempDir::new().unwrap();
    let exe = dir.child("app");
    exe.write_str("#!/bin/sh\necho original\n").unwrap();
    fs::set_permissions(exe.path(), fs::Permissions::from_mode(0o750)).unwrap();

    let missing = dir.child("download/vanished");
    let err = replace(exe.path(), missing.path(), mode).unwrap_err();

    assert!(matches!(err.source, SwapError::Io { .. }), "got: {err}");
    let rollback = err.rollback.expect("rollback after backup succeeded");
    dir.child("app.bak").assert(predicate::path::exists());

    rollback.run().expect("rollback");

    exe.assert("#!/bin/sh\necho original\n");
    assert_eq!(mode_of(exe.path()), 0o750, "original permissions restored");
    dir.child("app.bak").assert(predicate::path::missing());
}

#[test]
fn rollback_twice_fails_cleanly_without_touching_executable() {
    init_logging();
    let dir = assert_fs::TempDir::new().unwrap();
    let exe = dir.child("app");
    exe.write_str("original").unwrap();
    let candidate = dir.child("candidate");
    candidate.write_str("replacement").unwrap();

    let swapped = replace(exe.path(), candidate.path(), ReplaceMode::Copy).expect("replace");
    exe.assert("replacement");

    swapped.rollback.run().expect("first rollback");
    exe.assert("original");

    let err = swapped.rollback.run().unwrap_err();
    assert!(matches!(err, SwapError::Rollback { .. }), "got: {err}");
    exe.assert("original");
    assert!(!backup_path(exe.path()).exists());
}

#[test]
fn stale_backup_is_overwritten_by_new_swap() {
    init_logging();
    let dir = assert_fs::TempDir::new().unwrap();
    let exe = dir.child("app");
    exe.write_str("v2").unwrap();
    dir.child("app.bak").write_str("v1").unwrap();
    let candidate = dir.child("candidate");
    candidate.write_str("v3").unwrap();

    replace(exe.path(), candidate.path(), ReplaceMode::Copy).expect("replace");

    exe.assert("v3");
    dir.child("app.bak").assert("v2");
}

#[test]
fn leftover_backup_can_be_restored_by_executable_path() {
    init_logging();
    let dir = assert_fs::TempDir::new().unwrap();
    let exe = dir.child("app");
    exe.write_binary(b"half-written").unwrap();
    dir.child("app.bak").write_binary(b"last-good").unwrap();

    let rollback = Rollback::for_executable(exe.path());
    assert_eq!(rollback.backup(), backup_path(exe.path()));
    rollback.run().expect("restore");

    exe.assert("last-good");
    dir.child("app.bak").assert(predicate::path::missing());
}

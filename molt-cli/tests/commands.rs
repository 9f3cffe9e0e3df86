use std::fs;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn molt_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("molt"))
}

#[test]
fn checksum_prints_sha256_hex() {
    let dir = TempDir::new().expect("tempdir");
    let build = dir.path().join("build");
    fs::write(&build, b"abc").expect("write build");

    molt_cmd()
        .arg("checksum")
        .arg(&build)
        .assert()
        .success()
        .stdout(contains(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        ));
}

#[test]
fn checksum_of_missing_file_fails() {
    let dir = TempDir::new().expect("tempdir");
    molt_cmd()
        .arg("checksum")
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(contains("failed to hash"));
}

#[test]
fn rollback_restores_the_backup() {
    let dir = TempDir::new().expect("tempdir");
    let exe = dir.path().join("app");
    fs::write(&exe, b"broken").expect("write exe");
    fs::write(dir.path().join("app.bak"), b"previous").expect("write backup");

    molt_cmd()
        .arg("rollback")
        .arg(&exe)
        .assert()
        .success()
        .stdout(contains("restored"));

    assert_eq!(fs::read(&exe).expect("read exe"), b"previous");
    assert!(!dir.path().join("app.bak").exists());
}

#[test]
fn rollback_without_backup_fails_and_keeps_executable() {
    let dir = TempDir::new().expect("tempdir");
    let exe = dir.path().join("app");
    fs::write(&exe, b"current").expect("write exe");

    molt_cmd()
        .arg("rollback")
        .arg(&exe)
        .assert()
        .failure()
        .stderr(contains("no backup found"));

    assert_eq!(fs::read(&exe).expect("read exe"), b"current");
}

#[test]
fn run_requires_a_release_source() {
    molt_cmd()
        .args(["run", "--base-url", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(contains("--repo-name"));
}

#[test]
fn role_flag_is_hidden_from_help() {
    molt_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("checksum").and(contains("--update").not()));
}

//! The daemon side of the handshake, run for real: this test binary is
//! re-executed with the channel attached at fd 3 and one helper test
//! selected, the way a parent spawns its update daemon.

mod common;

use std::ffi::OsString;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use common::{script, FakeRepo};
use molt_core::UpdaterConfig;
use molt_daemon::channel::{self, Endpoint, Event};
use molt_daemon::paths::CHANNEL_FD;
use molt_daemon::{CycleOutcome, DaemonError, Exit, Invocation, Updater};

const SIDE_VAR: &str = "MOLT_TEST_CHILD_SIDE";
const DIR_VAR: &str = "MOLT_TEST_CHILD_DIR";

fn child_side() -> Option<String> {
    std::env::var(SIDE_VAR).ok()
}

/// Start this test binary running only `helper`, with the child end of a
/// fresh channel at fd 3. Returns the parent end.
fn spawn_helper(helper: &str, side: &str, dir: &TempDir) -> (tokio::process::Child, Endpoint) {
    let (parent, child) = channel::pair(true).expect("channel pair");
    let mut cmd = Command::new(std::env::current_exe().expect("test binary"));
    cmd.args([helper, "--exact", "--nocapture", "--test-threads=1"])
        .env(SIDE_VAR, side)
        .env(DIR_VAR, dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    channel::attach(&mut cmd, child.as_raw_fd());
    let process = cmd.spawn().expect("spawn helper");
    drop(child);
    (process, Endpoint::from_std(parent).expect("endpoint"))
}

async fn finish(process: tokio::process::Child) {
    let output = tokio::time::timeout(Duration::from_secs(30), process.wait_with_output())
        .await
        .expect("helper finishes")
        .expect("helper output");
    assert!(
        output.status.success(),
        "helper failed:\n{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );
}

#[tokio::test]
async fn inherited_endpoint_is_claimed_once() {
    if child_side().as_deref() != Some("endpoint") {
        return;
    }

    let stream = channel::take_inherited().expect("endpoint at fd 3");
    assert_eq!(stream.as_raw_fd(), CHANNEL_FD);
    assert!(matches!(
        channel::take_inherited(),
        Err(DaemonError::EndpointTaken)
    ));

    // SAFETY: fcntl(F_GETFD) only reads descriptor flags.
    let flags = unsafe { libc::fcntl(CHANNEL_FD, libc::F_GETFD) };
    assert_ne!(flags, -1);
    assert_ne!(flags & libc::FD_CLOEXEC, 0, "fd 3 must not leak into relaunches");

    let mut endpoint = Endpoint::from_std(stream).unwrap();
    endpoint.notify().await.unwrap();
    let reply = endpoint
        .wait_timeout(Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(reply, Some(Event::Signal));
}

#[tokio::test]
async fn spawned_daemon_takes_its_endpoint_and_handshakes() {
    if child_side().is_some() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let (process, mut endpoint) =
        spawn_helper("inherited_endpoint_is_claimed_once", "endpoint", &dir);

    let ready = endpoint
        .wait_timeout(Duration::from_secs(20))
        .await
        .unwrap();
    assert_eq!(ready, Some(Event::Signal));
    endpoint.notify().await.unwrap();

    finish(process).await;
}

#[tokio::test]
async fn child_role_installs_after_release() {
    if child_side().as_deref() != Some("daemon") {
        return;
    }
    let dir = PathBuf::from(std::env::var_os(DIR_VAR).expect("fixture dir"));

    let config = UpdaterConfig::builder(Duration::from_millis(50))
        .executable(dir.join("app"))
        .download_dir(dir.join("downloads"))
        .relaunch(false)
        .ack_timeout(Some(Duration::from_secs(10)))
        .build()
        .unwrap();
    let updater = Updater::new(config, FakeRepo::serving(b"#!/bin/sh\necho new build\n"));
    let invocation = Invocation::parse(
        "update",
        [OsString::from("app"), OsString::from("--update=true")],
    )
    .unwrap();

    let exit = updater
        .execute_as(invocation, CancellationToken::new())
        .await
        .expect("daemon runs");
    assert_eq!(
        exit,
        Exit::Swapped(CycleOutcome::Installed { relaunched: false })
    );
}

#[tokio::test]
async fn child_role_swaps_the_executable_once_the_parent_lets_go() {
    if child_side().is_some() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let exe = dir.path().join("app");
    script(&exe, "echo old build");
    let (process, mut endpoint) =
        spawn_helper("child_role_installs_after_release", "daemon", &dir);

    let ready = endpoint
        .wait_timeout(Duration::from_secs(20))
        .await
        .unwrap();
    assert_eq!(ready, Some(Event::Signal));
    assert!(std::fs::read_to_string(&exe).unwrap().contains("old build"));
    endpoint.notify().await.unwrap();
    drop(endpoint);

    finish(process).await;
    assert!(std::fs::read_to_string(&exe).unwrap().contains("new build"));
}

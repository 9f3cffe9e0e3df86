//! Parent role: spawn the update daemon, run the host workload, and vacate
//! when the daemon is ready to replace the executable.

use std::ffi::OsString;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use molt_core::{UpdaterConfig, Workload};

use crate::channel::{self, Endpoint, Event};
use crate::error::DaemonError;
use crate::paths::PARENT_READ_TIMEOUT;
use crate::startup::role_arg;

/// A running update daemon and the parent's end of the channel to it.
#[derive(Debug)]
pub struct SpawnedDaemon {
    pub child: Child,
    pub endpoint: Endpoint,
}

/// How the supervision loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The daemon is ready; the parent has acknowledged and must now exit.
    Vacate,
    /// The daemon went away and the parent is configured to keep running.
    ChildExited,
    /// The cancellation signal fired.
    Cancelled,
}

/// Start `exe` as the update daemon with the child end of a fresh channel
/// at the well-known descriptor slot.
pub fn spawn(
    config: &UpdaterConfig,
    exe: &Path,
    passthrough: &[OsString],
) -> Result<SpawnedDaemon, DaemonError> {
    let (parent_side, child_side) = channel::pair(true).map_err(DaemonError::Channel)?;

    let mut cmd = Command::new(exe);
    cmd.arg(role_arg(config.role_flag()))
        .args(passthrough)
        .stdin(Stdio::null());
    channel::attach(&mut cmd, child_side.as_raw_fd());

    let child = cmd.spawn().map_err(|source| DaemonError::Spawn {
        program: exe.to_path_buf(),
        source,
    })?;
    // The daemon holds its own copy now.
    drop(child_side);

    let endpoint = Endpoint::from_std(parent_side).map_err(DaemonError::Channel)?;
    tracing::info!(
        pid = child.id().unwrap_or_default(),
        exe = %exe.display(),
        "update daemon started",
    );
    Ok(SpawnedDaemon { child, endpoint })
}

/// Wait for the daemon in the background so it never lingers as a zombie.
pub fn reap(mut child: Child) {
    tokio::spawn(async move {
        let pid = child.id().unwrap_or_default();
        match child.wait().await {
            Ok(status) => tracing::info!(pid, %status, "update daemon exited"),
            Err(err) => tracing::warn!(pid, error = %err, "waiting for update daemon failed"),
        }
    });
}

/// Run `workload` in the background and watch the channel until the daemon
/// is ready, goes away, or `cancel` fires.
pub async fn run_supervised(
    cancel: &CancellationToken,
    config: &UpdaterConfig,
    endpoint: &mut Endpoint,
    workload: Option<Workload>,
) -> SupervisorExit {
    if let Some(workload) = workload {
        tokio::spawn(workload);
    }
    supervise(cancel, config, endpoint, PARENT_READ_TIMEOUT).await
}

pub(crate) async fn supervise(
    cancel: &CancellationToken,
    config: &UpdaterConfig,
    endpoint: &mut Endpoint,
    read_timeout: std::time::Duration,
) -> SupervisorExit {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return SupervisorExit::Cancelled,
            event = endpoint.wait_timeout(read_timeout) => event,
        };

        let closed = match event {
            Ok(None) => continue,
            Ok(Some(Event::Signal)) => false,
            Ok(Some(Event::Closed)) => true,
            Err(err) => {
                tracing::warn!(error = %err, "update channel read failed");
                true
            }
        };

        if closed && !config.parent_exits_with_child() {
            tracing::warn!("update daemon closed the channel; continuing without updates");
            return SupervisorExit::ChildExited;
        }

        if closed {
            tracing::info!("update daemon closed the channel");
        } else {
            tracing::info!("update daemon reports an update is ready");
        }

        if !config.immediate_exit() {
            if let Some(notifier) = config.ready_notifier() {
                notifier.update_ready(None);
            }
        }

        if !closed && !config.parent_exits_on_ready() {
            tracing::info!("staying resident; the update daemon will not get a release");
            continue;
        }

        if !closed {
            if let Err(err) = endpoint.notify().await {
                tracing::debug!(error = %err, "release acknowledgement not delivered");
            }
        }
        return SupervisorExit::Vacate;
    }
}

//! Child role: the update daemon.
//!
//! Every tick runs one cycle:
//!
//! 1. check, approve, download, validate (see [`crate::fetch`])
//! 2. signal the parent and wait for it to release the executable
//! 3. replace the executable, rolling back on failure
//! 4. relaunch whatever executable ended up in place
//!
//! Steps 3 and 4 run on the blocking pool and are never interrupted by
//! cancellation once started.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use molt_core::{Provider, ReplaceMode, UpdaterConfig};
use molt_swap::{discard_candidate, replace, Rollback, Swapped};

use crate::channel::Endpoint;
use crate::error::CycleError;
use crate::fetch::{fetch_candidate, FetchOutcome};

/// What one completed cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The provider had nothing newer.
    NoUpdate,
    /// The download gate turned the update down.
    Declined,
    /// The new build is in place.
    Installed { relaunched: bool },
    /// The replacement did not stick; the previous build is in place (or
    /// restoring it failed, which has been logged).
    RolledBack { relaunched: bool },
}

impl CycleOutcome {
    /// Whether the executable was handed over, i.e. the parent is gone and
    /// the daemon has nothing left to supervise.
    pub fn swapped(self) -> bool {
        matches!(
            self,
            CycleOutcome::Installed { .. } | CycleOutcome::RolledBack { .. }
        )
    }
}

/// How the daemon loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    Cancelled,
    /// A cycle went through replacement and the daemon is configured to
    /// exit afterwards.
    Swapped(CycleOutcome),
}

pub struct UpdateDaemon<P: Provider> {
    config: Arc<UpdaterConfig>,
    provider: Arc<P>,
    endpoint: Endpoint,
    executable: PathBuf,
    relaunch_args: Vec<OsString>,
}

impl<P: Provider + 'static> UpdateDaemon<P> {
    /// `relaunch_args` is the host's own argument list, without the role
    /// flag, handed to the relaunched instance.
    pub fn new(
        config: Arc<UpdaterConfig>,
        provider: Arc<P>,
        endpoint: Endpoint,
        executable: PathBuf,
        relaunch_args: Vec<OsString>,
    ) -> Self {
        Self {
            config,
            provider,
            endpoint,
            executable,
            relaunch_args,
        }
    }

    /// Poll until cancelled or until a swap ends the daemon's job.
    pub async fn run(mut self, cancel: CancellationToken) -> DaemonExit {
        let mut interval = time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; wait a full interval first.
        interval.tick().await;

        tracing::info!(
            interval_secs = self.config.poll_interval().as_secs_f64(),
            exe = %self.executable.display(),
            "update daemon polling",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("update daemon cancelled");
                    return DaemonExit::Cancelled;
                }
                _ = interval.tick() => {}
            }

            match self.run_cycle(&cancel).await {
                Ok(outcome) if outcome.swapped() && self.config.child_exits_after_swap() => {
                    return DaemonExit::Swapped(outcome);
                }
                Ok(outcome) => tracing::debug!(?outcome, "update cycle finished"),
                Err(CycleError::Cancelled) => {
                    tracing::info!("update daemon cancelled mid-cycle");
                    return DaemonExit::Cancelled;
                }
                Err(err) => {
                    tracing::warn!(phase = err.phase(), error = %err, "update cycle failed");
                }
            }
        }
    }

    /// One full check-to-relaunch cycle.
    pub async fn run_cycle(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, CycleError> {
        let candidate = match fetch_candidate(self.provider.as_ref(), &self.config, cancel).await? {
            FetchOutcome::NoUpdate => return Ok(CycleOutcome::NoUpdate),
            FetchOutcome::Declined => {
                tracing::info!("update available but declined");
                return Ok(CycleOutcome::Declined);
            }
            FetchOutcome::Ready(path) => path,
        };

        // Signaling and awaiting release.
        if let Err(err) = self.handshake(cancel).await {
            discard_candidate(&candidate);
            return Err(err);
        }

        // Replacing and relaunching.
        let exe = self.executable.clone();
        let mode = self.config.replace_mode();
        let relaunch = self.config.relaunch().then(|| self.relaunch_args.clone());
        tokio::task::spawn_blocking(move || install(&exe, &candidate, mode, relaunch.as_deref()))
            .await
            .map_err(|e| CycleError::Join {
                task: "replace",
                message: e.to_string(),
            })
    }

    /// Tell the parent a build is ready and wait until it lets go of the
    /// executable.
    ///
    /// A parent that acknowledged an earlier cycle after this side stopped
    /// waiting has already vacated: its ack byte or its closed end is still
    /// on the channel, and a signal to it fails with a broken pipe. Either
    /// way the release has happened and the handshake is skipped.
    async fn handshake(&mut self, cancel: &CancellationToken) -> Result<(), CycleError> {
        if let Some(event) = self.endpoint.try_wait().map_err(CycleError::Signal)? {
            tracing::info!(?event, "parent released the executable before the signal");
            return Ok(());
        }

        match self.endpoint.notify().await {
            Ok(()) => self.await_release(cancel).await,
            Err(err) if parent_gone(&err) => {
                tracing::info!(error = %err, "parent already exited; proceeding with the swap");
                Ok(())
            }
            Err(err) => Err(CycleError::Signal(err)),
        }
    }

    /// The parent acknowledges with a byte or by exiting; both count.
    async fn await_release(&mut self, cancel: &CancellationToken) -> Result<(), CycleError> {
        let limit = self.config.ack_timeout();
        let released = async {
            match limit {
                Some(limit) => match time::timeout(limit, self.endpoint.wait()).await {
                    Ok(event) => event.map_err(CycleError::Release),
                    Err(_elapsed) => Err(CycleError::ReleaseTimeout(limit)),
                },
                None => self.endpoint.wait().await.map_err(CycleError::Release),
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(CycleError::Cancelled),
            event = released => {
                let event = event?;
                tracing::info!(?event, "parent released the executable");
                Ok(())
            }
        }
    }
}

fn parent_gone(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
    )
}

/// Replace `exe` with `candidate`, then relaunch. Never fails: every error
/// is logged and the outcome reports what is on disk.
pub(crate) fn install(
    exe: &Path,
    candidate: &Path,
    mode: ReplaceMode,
    relaunch: Option<&[OsString]>,
) -> CycleOutcome {
    let (mut swapped, mut rollback) = match replace(exe, candidate, mode) {
        Ok(swapped) => {
            // A link keeps pointing at the candidate; only a copy frees it.
            if mode == ReplaceMode::Copy {
                discard_candidate(candidate);
            }
            let rollback = swapped.rollback.clone();
            (Some(swapped), Some(rollback))
        }
        Err(err) => {
            tracing::error!(phase = "replacing", error = %err, "replacing executable failed");
            discard_candidate(candidate);
            if let Some(rollback) = err.rollback {
                restore(&rollback);
            }
            (None, None)
        }
    };

    let Some(args) = relaunch else {
        let installed = swapped.is_some();
        confirm(swapped.take());
        return outcome(installed, false);
    };

    loop {
        match spawn_detached(exe, args) {
            Ok(pid) => {
                tracing::info!(pid, exe = %exe.display(), "relaunched");
                let installed = swapped.is_some();
                confirm(swapped.take());
                return outcome(installed, true);
            }
            Err(err) => {
                tracing::error!(exe = %exe.display(), error = %err, "relaunch failed");
                let Some(previous) = rollback.take() else {
                    tracing::error!("no previous executable to fall back to; giving up");
                    return outcome(swapped.is_some(), false);
                };
                swapped = None;
                restore(&previous);
                if mode == ReplaceMode::Link {
                    discard_candidate(candidate);
                }
            }
        }
    }
}

fn outcome(installed: bool, relaunched: bool) -> CycleOutcome {
    if installed {
        CycleOutcome::Installed { relaunched }
    } else {
        CycleOutcome::RolledBack { relaunched }
    }
}

/// Drop the backup of a swap that is now known good.
fn confirm(swapped: Option<Swapped>) {
    let Some(swapped) = swapped else { return };
    let backup = swapped.rollback.backup().to_path_buf();
    if let Err(err) = swapped.discard_backup() {
        tracing::warn!(backup = %backup.display(), error = %err, "failed to remove backup");
    }
}

fn restore(rollback: &Rollback) {
    match rollback.run() {
        Ok(()) => tracing::warn!(
            exe = %rollback.current().display(),
            "rolled back to previous executable",
        ),
        Err(err) => tracing::error!(
            exe = %rollback.current().display(),
            error = %err,
            "ROLLBACK FAILED; executable may be missing",
        ),
    }
}

/// Start `exe` as an independent process. A thread waits on it so it does
/// not linger as a zombie while this process is still alive.
fn spawn_detached(exe: &Path, args: &[OsString]) -> std::io::Result<u32> {
    let mut child = Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .spawn()?;
    let pid = child.id();
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(pid)
}

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use molt_core::{Provider, Role, UpdaterConfig};

use crate::channel::{self, Endpoint};
use crate::daemon::{CycleOutcome, DaemonExit, UpdateDaemon};
use crate::error::{io_err, DaemonError};
use crate::paths::current_executable;
use crate::simple::SimpleUpdater;
use crate::startup::Invocation;
use crate::supervisor::{self, SupervisorExit};

/// How a role finished. [`Exit::Vacate`] and [`Exit::Swapped`] mean the
/// process should terminate now; [`start_blocking`] does that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Parent: the daemon is about to replace the executable.
    Vacate,
    /// Child: the replacement cycle ran to the end.
    Swapped(CycleOutcome),
    /// Either role: cancelled.
    Stopped,
}

/// Role controller for the respawning updater.
pub struct Updater<P: Provider> {
    config: Arc<UpdaterConfig>,
    provider: Arc<P>,
}

impl<P: Provider + 'static> Updater<P> {
    pub fn new(config: UpdaterConfig, provider: P) -> Self {
        Self {
            config: Arc::new(config),
            provider: Arc::new(provider),
        }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Single-process variant over the same configuration and provider.
    pub fn into_simple(self) -> SimpleUpdater<P> {
        SimpleUpdater::new(self.config, self.provider)
    }

    /// Pick the role from this process's arguments and run it.
    pub async fn execute(self, cancel: CancellationToken) -> Result<Exit, DaemonError> {
        let invocation = Invocation::from_env(self.config.role_flag())?;
        self.execute_as(invocation, cancel).await
    }

    pub async fn execute_as(
        self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<Exit, DaemonError> {
        tracing::info!(role = %invocation.role, "updater starting");
        match invocation.role {
            Role::Parent => self.run_parent(invocation, cancel).await,
            Role::Child => self.run_child(invocation, cancel).await,
        }
    }

    async fn run_parent(
        self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<Exit, DaemonError> {
        let workload = self
            .config
            .take_workload()
            .ok_or(DaemonError::MissingWorkload)?;
        let exe = current_executable(&self.config)?;

        let supervisor::SpawnedDaemon {
            child,
            mut endpoint,
        } = supervisor::spawn(&self.config, &exe, &invocation.passthrough)?;
        supervisor::reap(child);

        match supervisor::run_supervised(&cancel, &self.config, &mut endpoint, Some(workload)).await
        {
            SupervisorExit::Vacate => Ok(Exit::Vacate),
            SupervisorExit::Cancelled => Ok(Exit::Stopped),
            SupervisorExit::ChildExited => {
                // Keep serving the workload without updates.
                cancel.cancelled().await;
                Ok(Exit::Stopped)
            }
        }
    }

    async fn run_child(
        self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<Exit, DaemonError> {
        let stream = channel::take_inherited()?;
        let endpoint = Endpoint::from_std(stream).map_err(DaemonError::Channel)?;
        let exe = current_executable(&self.config)?;

        let daemon = UpdateDaemon::new(
            self.config,
            self.provider,
            endpoint,
            exe,
            invocation.passthrough,
        );
        match daemon.run(cancel).await {
            DaemonExit::Cancelled => Ok(Exit::Stopped),
            DaemonExit::Swapped(outcome) => Ok(Exit::Swapped(outcome)),
        }
    }
}

/// Run the respawning updater on a fresh runtime and block until it is done.
/// Exits the process when the role calls for it.
pub fn start_blocking<P: Provider + 'static>(updater: Updater<P>) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    let exit = runtime.block_on(async move {
        let cancel = cancel_on_ctrl_c();
        updater.execute(cancel).await
    })?;

    match exit {
        Exit::Vacate => {
            tracing::info!("parent vacating for update");
            std::process::exit(0);
        }
        Exit::Swapped(outcome) => {
            tracing::info!(?outcome, "update daemon done");
            std::process::exit(0);
        }
        Exit::Stopped => Ok(()),
    }
}

/// Run the single-process updater next to the configured workload, if any,
/// until Ctrl-C.
pub fn start_simple_blocking<P: Provider + 'static>(
    updater: SimpleUpdater<P>,
) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async move {
        let cancel = cancel_on_ctrl_c();
        if let Some(workload) = updater.config().take_workload() {
            tokio::spawn(workload);
        }
        updater.run(cancel).await;
    });
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received Ctrl-C, shutting down");
                token.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "failed to listen for Ctrl-C"),
        }
    });
    cancel
}

/// Install the fmt subscriber (`RUST_LOG`, default `info`). Later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

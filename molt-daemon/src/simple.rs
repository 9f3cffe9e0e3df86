//! Single-process mode: no respawn, no replacement.
//!
//! A timer runs check, approve, download and validate, then hands the
//! verified candidate to the configured ready notifier. Restarting is up to
//! the embedding application. An [`UpdateSwitch`] pauses and resumes polling
//! at runtime.

use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use molt_core::{Provider, UpdateSwitch, UpdaterConfig};

use crate::error::CycleError;
use crate::fetch::{fetch_candidate, FetchOutcome};

pub struct SimpleUpdater<P: Provider> {
    config: Arc<UpdaterConfig>,
    provider: Arc<P>,
    switch: UpdateSwitch,
}

impl<P: Provider + 'static> SimpleUpdater<P> {
    pub fn new(config: Arc<UpdaterConfig>, provider: Arc<P>) -> Self {
        Self {
            config,
            provider,
            switch: UpdateSwitch::default(),
        }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Handle for enabling and disabling polling from any task or thread.
    pub fn switch(&self) -> UpdateSwitch {
        self.switch.clone()
    }

    /// Poll until `cancel` fires. Ticks that find the switch off are skipped.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("simple updater stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            if !self.switch.is_enabled() {
                tracing::debug!("updates disabled; skipping tick");
                continue;
            }

            match self.check_once(&cancel).await {
                Ok(outcome) => tracing::debug!(?outcome, "update check finished"),
                Err(CycleError::Cancelled) => return,
                Err(err) => {
                    tracing::warn!(phase = err.phase(), error = %err, "update check failed");
                }
            }
        }
    }

    /// Run one check and, on success, pass the candidate path to the ready
    /// notifier.
    pub async fn check_once(&self, cancel: &CancellationToken) -> Result<FetchOutcome, CycleError> {
        let outcome = fetch_candidate(self.provider.as_ref(), &self.config, cancel).await?;
        if let FetchOutcome::Ready(path) = &outcome {
            match self.config.ready_notifier() {
                Some(notifier) => notifier.update_ready(Some(path.as_path())),
                None => {
                    tracing::info!(path = %path.display(), "update ready; no notifier configured");
                }
            }
        }
        Ok(outcome)
    }
}

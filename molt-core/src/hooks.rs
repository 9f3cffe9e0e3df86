//! Extension points surfaced to the embedding application.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Asked once per cycle after the provider reports an update.
pub trait DownloadGate: Send + Sync {
    /// Return `false` to skip this update for the current cycle.
    fn should_download(&self) -> bool;
}

/// Default gate: every available update is downloaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDownload;

impl DownloadGate for AlwaysDownload {
    fn should_download(&self) -> bool {
        true
    }
}

impl<F> DownloadGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_download(&self) -> bool {
        self()
    }
}

/// Told that an update is ready.
///
/// In the respawn deployment the parent calls it with `None` just before it
/// vacates. In the single-process deployment it receives the path of the
/// validated candidate and owns everything from there.
pub trait ReadyNotifier: Send + Sync {
    fn update_ready(&self, candidate: Option<&Path>);
}

impl<F> ReadyNotifier for F
where
    F: Fn(Option<&Path>) + Send + Sync,
{
    fn update_ready(&self, candidate: Option<&Path>) {
        self(candidate)
    }
}

/// Runtime on/off switch for the single-process updater.
///
/// Clones share one flag. Reads and writes are plain atomic loads/stores so
/// any task or thread may flip it without coordination.
#[derive(Debug, Clone)]
pub struct UpdateSwitch {
    enabled: Arc<AtomicBool>,
}

impl UpdateSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Default for UpdateSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

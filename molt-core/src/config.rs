//! Updater configuration.
//!
//! Built once through [`UpdaterConfig::builder`] and read-only afterwards.
//! Each process (parent and child) builds its own copy from the same host
//! code; nothing is shared between them at runtime.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::CoreError;
use crate::hooks::{AlwaysDownload, DownloadGate, ReadyNotifier};
use crate::policy::{NamePolicy, TimeNamePolicy};
use crate::types::ReplaceMode;

/// Name of the boolean flag that marks a child (update daemon) invocation.
pub const DEFAULT_ROLE_FLAG: &str = "update";

/// Candidate files land here unless configured otherwise (relative to the
/// working directory).
pub const DEFAULT_DOWNLOAD_DIR: &str = "download";

/// How long the child waits for the parent to release the executable.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// The host application's main work, run next to the supervision loop.
pub type Workload = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct UpdaterConfig {
    poll_interval: Duration,
    workload: Mutex<Option<Workload>>,
    download_gate: Arc<dyn DownloadGate>,
    ready_notifier: Option<Arc<dyn ReadyNotifier>>,
    download_dir: PathBuf,
    name_policy: Arc<dyn NamePolicy>,
    role_flag: String,
    immediate_exit: bool,
    replace_mode: ReplaceMode,
    executable: Option<PathBuf>,
    relaunch: bool,
    parent_exits_on_ready: bool,
    parent_exits_with_child: bool,
    child_exits_after_swap: bool,
    ack_timeout: Option<Duration>,
}

impl UpdaterConfig {
    /// Start a builder. `poll_interval` is the only required value.
    pub fn builder(poll_interval: Duration) -> UpdaterConfigBuilder {
        UpdaterConfigBuilder::new(poll_interval)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Hand the workload over to whoever runs it. Returns `None` on every
    /// call after the first.
    pub fn take_workload(&self) -> Option<Workload> {
        self.workload.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn has_workload(&self) -> bool {
        self.workload
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn download_gate(&self) -> &dyn DownloadGate {
        self.download_gate.as_ref()
    }

    pub fn ready_notifier(&self) -> Option<&dyn ReadyNotifier> {
        self.ready_notifier.as_deref()
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn name_policy(&self) -> &dyn NamePolicy {
        self.name_policy.as_ref()
    }

    pub fn role_flag(&self) -> &str {
        &self.role_flag
    }

    /// When set, the parent skips the ready notifier and vacates at once.
    pub fn immediate_exit(&self) -> bool {
        self.immediate_exit
    }

    pub fn replace_mode(&self) -> ReplaceMode {
        self.replace_mode
    }

    /// Explicit executable path, overriding the process's own.
    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    pub fn relaunch(&self) -> bool {
        self.relaunch
    }

    pub fn parent_exits_on_ready(&self) -> bool {
        self.parent_exits_on_ready
    }

    pub fn parent_exits_with_child(&self) -> bool {
        self.parent_exits_with_child
    }

    pub fn child_exits_after_swap(&self) -> bool {
        self.child_exits_after_swap
    }

    /// `None` waits for the release acknowledgement without a deadline.
    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout
    }
}

impl fmt::Debug for UpdaterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdaterConfig")
            .field("poll_interval", &self.poll_interval)
            .field("workload", &self.has_workload())
            .field("ready_notifier", &self.ready_notifier.is_some())
            .field("download_dir", &self.download_dir)
            .field("role_flag", &self.role_flag)
            .field("immediate_exit", &self.immediate_exit)
            .field("replace_mode", &self.replace_mode)
            .field("executable", &self.executable)
            .field("relaunch", &self.relaunch)
            .field("parent_exits_on_ready", &self.parent_exits_on_ready)
            .field("parent_exits_with_child", &self.parent_exits_with_child)
            .field("child_exits_after_swap", &self.child_exits_after_swap)
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`UpdaterConfig`].
pub struct UpdaterConfigBuilder {
    config: UpdaterConfig,
}

impl UpdaterConfigBuilder {
    fn new(poll_interval: Duration) -> Self {
        Self {
            config: UpdaterConfig {
                poll_interval,
                workload: Mutex::new(None),
                download_gate: Arc::new(AlwaysDownload),
                ready_notifier: None,
                download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
                name_policy: Arc::new(TimeNamePolicy::default()),
                role_flag: DEFAULT_ROLE_FLAG.to_string(),
                immediate_exit: false,
                replace_mode: ReplaceMode::Copy,
                executable: None,
                relaunch: true,
                parent_exits_on_ready: true,
                parent_exits_with_child: true,
                child_exits_after_swap: true,
                ack_timeout: Some(DEFAULT_ACK_TIMEOUT),
            },
        }
    }

    /// The host's main work. Required when the process ends up as the parent.
    pub fn workload<F>(mut self, workload: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.config.workload = Mutex::new(Some(Box::pin(workload)));
        self
    }

    pub fn download_gate(mut self, gate: impl DownloadGate + 'static) -> Self {
        self.config.download_gate = Arc::new(gate);
        self
    }

    pub fn ready_notifier(mut self, notifier: impl ReadyNotifier + 'static) -> Self {
        self.config.ready_notifier = Some(Arc::new(notifier));
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    pub fn name_policy(mut self, policy: impl NamePolicy + 'static) -> Self {
        self.config.name_policy = Arc::new(policy);
        self
    }

    pub fn role_flag(mut self, flag: impl Into<String>) -> Self {
        self.config.role_flag = flag.into();
        self
    }

    pub fn immediate_exit(mut self, immediate: bool) -> Self {
        self.config.immediate_exit = immediate;
        self
    }

    pub fn replace_mode(mut self, mode: ReplaceMode) -> Self {
        self.config.replace_mode = mode;
        self
    }

    /// Must be absolute.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.executable = Some(path.into());
        self
    }

    pub fn relaunch(mut self, relaunch: bool) -> Self {
        self.config.relaunch = relaunch;
        self
    }

    pub fn parent_exits_on_ready(mut self, exit: bool) -> Self {
        self.config.parent_exits_on_ready = exit;
        self
    }

    pub fn parent_exits_with_child(mut self, exit: bool) -> Self {
        self.config.parent_exits_with_child = exit;
        self
    }

    pub fn child_exits_after_swap(mut self, exit: bool) -> Self {
        self.config.child_exits_after_swap = exit;
        self
    }

    pub fn ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<UpdaterConfig, CoreError> {
        let config = self.config;

        if config.poll_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        let flag = config.role_flag.as_str();
        if flag.is_empty()
            || flag.starts_with('-')
            || flag.contains('=')
            || flag.chars().any(char::is_whitespace)
        {
            return Err(CoreError::InvalidConfig(format!(
                "role flag '{flag}' must be a bare name without dashes, '=' or whitespace"
            )));
        }

        if let Some(exe) = &config.executable {
            if !exe.is_absolute() {
                return Err(CoreError::InvalidConfig(format!(
                    "executable override must be an absolute path: {}",
                    exe.display()
                )));
            }
        }

        if config.ack_timeout.is_some_and(|t| t.is_zero()) {
            return Err(CoreError::InvalidConfig(
                "acknowledgement timeout must be greater than zero".to_string(),
            ));
        }

        if config.download_dir.as_os_str().is_empty() {
            return Err(CoreError::InvalidConfig(
                "download directory must not be empty".to_string(),
            ));
        }

        Ok(config)
    }
}

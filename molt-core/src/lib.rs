//! molt core library: roles, updater configuration, and the capability
//! traits the update machinery is plugged together with.
//!
//! Public API surface:
//! - [`types`]: [`Role`] and [`ReplaceMode`]
//! - [`config`]: [`UpdaterConfig`] and its builder
//! - [`provider`]: the [`Provider`] release-source contract
//! - [`policy`]: download file naming
//! - [`hooks`]: approval gate, readiness notifier, runtime switch
//! - [`error`]: [`CoreError`], [`ProviderError`]

pub mod config;
pub mod error;
pub mod hooks;
pub mod policy;
pub mod provider;
pub mod types;

pub use config::{UpdaterConfig, UpdaterConfigBuilder, Workload};
pub use error::{CoreError, ProviderError};
pub use hooks::{AlwaysDownload, DownloadGate, ReadyNotifier, UpdateSwitch};
pub use policy::{NamePolicy, TimeNamePolicy};
pub use provider::{DownloadSink, Provider, ValidationSource};
pub use types::{ReplaceMode, Role};

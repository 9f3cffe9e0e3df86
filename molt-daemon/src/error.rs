use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use molt_core::{CoreError, ProviderError};
use molt_swap::SwapError;

/// Error surface for role selection, process supervision, and the channel.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse startup arguments: {0}")]
    Startup(#[from] clap::Error),

    #[error("updater channel setup failed: {0}")]
    Channel(#[source] std::io::Error),

    #[error("start update daemon {program} failed: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no inherited channel endpoint at descriptor {fd}")]
    EndpointMissing { fd: i32 },

    #[error("inherited channel endpoint was already taken")]
    EndpointTaken,

    #[error("a workload is required when running as the parent")]
    MissingWorkload,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

/// Why one update cycle was abandoned. Every variant is logged and the next
/// tick retries, except [`CycleError::Cancelled`], which ends the loop.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("check update failed: {0}")]
    Check(#[source] ProviderError),

    #[error("generate candidate name failed: {0}")]
    Naming(#[from] CoreError),

    #[error("prepare candidate failed: {0}")]
    Candidate(#[from] SwapError),

    #[error("download failed: {0}")]
    Download(#[source] ProviderError),

    #[error("validation failed: {0}")]
    Validate(#[source] ProviderError),

    #[error("signal parent failed: {0}")]
    Signal(#[source] std::io::Error),

    #[error("parent did not release the executable within {0:?}")]
    ReleaseTimeout(Duration),

    #[error("waiting for release failed: {0}")]
    Release(#[source] std::io::Error),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },

    #[error("cycle cancelled")]
    Cancelled,
}

impl CycleError {
    /// Phase label used in log lines.
    pub fn phase(&self) -> &'static str {
        match self {
            CycleError::Check(_) => "checking",
            CycleError::Naming(_) | CycleError::Candidate(_) | CycleError::Download(_) => {
                "downloading"
            }
            CycleError::Validate(_) => "validating",
            CycleError::Signal(_) => "signaling",
            CycleError::ReleaseTimeout(_) | CycleError::Release(_) => "awaiting-release",
            CycleError::Join { .. } => "replacing",
            CycleError::Cancelled => "cancelled",
        }
    }

    /// Provider errors that report cancellation collapse into
    /// [`CycleError::Cancelled`].
    pub(crate) fn from_provider(
        err: ProviderError,
        wrap: fn(ProviderError) -> CycleError,
    ) -> CycleError {
        match err {
            ProviderError::Cancelled => CycleError::Cancelled,
            other => wrap(other),
        }
    }
}

//! Error types for molt-core.

use thiserror::Error;

/// Errors raised while assembling configuration or applying a policy.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration value failed validation in [`crate::UpdaterConfigBuilder::build`].
    #[error("invalid updater configuration: {0}")]
    InvalidConfig(String),

    /// The naming policy could not produce a file name.
    #[error("name policy failed: {0}")]
    NamePolicy(String),
}

/// Errors reported by a [`crate::Provider`].
///
/// Every variant is recoverable from the daemon's point of view: the cycle is
/// abandoned and retried on the next tick.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or remote-side failure while checking or downloading.
    #[error("transport error: {0}")]
    Transport(String),

    /// The downloaded artifact does not match the published digest.
    #[error("integrity check failed (expected {expected}, got {actual})")]
    Integrity { expected: String, actual: String },

    /// The artifact is bigger than the provider accepts.
    #[error("artifact exceeds the {limit}-byte limit")]
    TooLarge { limit: u64 },

    /// Local I/O failure while streaming into or out of the candidate file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cycle's cancellation signal fired mid-operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Anything else the provider wants to surface.
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn transport(msg: impl Into<String>) -> Self {
        ProviderError::Transport(msg.into())
    }
}

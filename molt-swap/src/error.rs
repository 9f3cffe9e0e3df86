//! Error types for molt-swap.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while preparing or swapping executables.
#[derive(Debug, Error)]
pub enum SwapError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The download location exists but is not a directory.
    #[error("download location {path} is not a directory")]
    NotADirectory { path: PathBuf },

    /// The naming policy produced something that is not a single file name.
    #[error("invalid candidate file name '{name}'")]
    InvalidName { name: String },

    /// A candidate with the generated name is already on disk.
    #[error("candidate file already exists: {path}")]
    CandidateExists { path: PathBuf },

    /// Renaming the running executable to its backup failed; nothing changed.
    #[error("backup of {path} failed: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Restoring the backup over the executable path failed.
    #[error("rollback from {backup} failed: {source}")]
    Rollback {
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SwapError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SwapError {
    SwapError::Io {
        path: path.into(),
        source,
    }
}

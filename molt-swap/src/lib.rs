//! # molt-swap
//!
//! Executable replacement engine and candidate-file handling.
//!
//! Call [`replace`] to back up the running executable and put a verified
//! candidate in its place; keep the returned [`Rollback`] to undo it. The
//! [`candidate`] module creates and discards downloaded candidates.

pub mod candidate;
pub mod error;
pub mod replace;

pub use candidate::{create_candidate, discard_candidate, ensure_download_dir};
pub use error::SwapError;
pub use replace::{backup_path, replace, ReplaceError, Rollback, Swapped};

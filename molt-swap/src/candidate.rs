//! Candidate files: freshly downloaded builds waiting to be verified and
//! installed.
//!
//! The download directory is created on demand. Candidates are always
//! created exclusively so an existing file is never truncated, and carry
//! executable permission bits from the start.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};

use crate::error::{io_err, SwapError};

const DOWNLOAD_DIR_MODE: u32 = 0o777;
const CANDIDATE_MODE: u32 = 0o755;

/// Make sure `dir` exists and is a directory.
pub fn ensure_download_dir(dir: &Path) -> Result<(), SwapError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SwapError::NotADirectory {
            path: dir.to_path_buf(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            DirBuilder::new()
                .recursive(true)
                .mode(DOWNLOAD_DIR_MODE)
                .create(dir)
                .map_err(|e| io_err(dir, e))?;
            tracing::info!("created download directory {}", dir.display());
            Ok(())
        }
        Err(err) => Err(io_err(dir, err)),
    }
}

/// Create `<dir>/<name>` exclusively, opened for both writing the download and
/// reading it back for verification.
pub fn create_candidate(dir: &Path, name: &str) -> Result<(File, PathBuf), SwapError> {
    if !is_plain_file_name(name) {
        return Err(SwapError::InvalidName {
            name: name.to_string(),
        });
    }

    ensure_download_dir(dir)?;

    let path = dir.join(name);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(CANDIDATE_MODE)
        .open(&path)
        .map_err(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                SwapError::CandidateExists { path: path.clone() }
            } else {
                io_err(&path, err)
            }
        })?;

    tracing::debug!("created candidate {}", path.display());
    Ok((file, path))
}

/// Remove a candidate that failed to download or verify. A missing file is
/// not an error; anything else is logged and swallowed.
pub fn discard_candidate(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("discarded candidate {}", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("failed to discard candidate {}: {}", path.display(), err),
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

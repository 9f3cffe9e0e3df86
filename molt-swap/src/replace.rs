//! Executable replacement engine.
//!
//! ## `replace`: 3-step protocol
//!
//! 1. Rename the current executable to `<path>.bak`. Nothing else happens
//!    unless this succeeds; from here on a [`Rollback`] exists.
//! 2. Put the candidate at `<path>`: stream its bytes into a fresh file
//!    ([`ReplaceMode::Copy`]) or symlink to it ([`ReplaceMode::Link`]).
//! 3. Mark the result executable.
//!
//! A failure in 2 or 3 leaves `<path>` absent or truncated and hands the
//! rollback back to the caller inside [`ReplaceError`]. There is no other
//! partial-write recovery.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use molt_core::ReplaceMode;
use thiserror::Error;

use crate::error::{io_err, SwapError};

const EXECUTABLE_MODE: u32 = 0o755;

/// `<current>.bak`
pub fn backup_path(current: &Path) -> PathBuf {
    let mut name = OsString::from(current.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Undoes a replacement by renaming the backup over the executable path.
///
/// Safe to run more than once: after the first success the backup is gone
/// and later runs fail with [`SwapError::Rollback`] without touching
/// `current`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollback {
    current: PathBuf,
    backup: PathBuf,
}

impl Rollback {
    /// The rollback for a swap of `current` left behind by an earlier,
    /// interrupted run.
    pub fn for_executable(current: impl Into<PathBuf>) -> Self {
        let current = current.into();
        let backup = backup_path(&current);
        Self { current, backup }
    }

    pub fn run(&self) -> Result<(), SwapError> {
        fs::rename(&self.backup, &self.current).map_err(|source| SwapError::Rollback {
            backup: self.backup.clone(),
            source,
        })?;
        tracing::info!(
            "restored {} from {}",
            self.current.display(),
            self.backup.display()
        );
        Ok(())
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }
}

/// A completed replacement. The backup is still on disk until
/// [`Swapped::discard_backup`] confirms the swap.
#[derive(Debug)]
pub struct Swapped {
    pub rollback: Rollback,
    pub mode: ReplaceMode,
}

impl Swapped {
    /// Drop the backup once the new executable is known to start.
    pub fn discard_backup(self) -> Result<(), SwapError> {
        let backup = self.rollback.backup;
        match fs::remove_file(&backup) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(backup, err)),
        }
    }
}

/// Failure of [`replace`]. `rollback` is `None` only when the backup rename
/// itself failed, in which case the executable was never touched.
#[derive(Debug, Error)]
#[error("replacing {current} failed: {source}")]
pub struct ReplaceError {
    pub current: PathBuf,
    #[source]
    pub source: SwapError,
    pub rollback: Option<Rollback>,
}

/// Replace the executable at `current` with `candidate`.
pub fn replace(
    current: &Path,
    candidate: &Path,
    mode: ReplaceMode,
) -> Result<Swapped, ReplaceError> {
    let backup = backup_path(current);

    // Step 1: move the live executable aside.
    if let Err(source) = fs::rename(current, &backup) {
        return Err(ReplaceError {
            current: current.to_path_buf(),
            source: SwapError::Backup {
                path: current.to_path_buf(),
                source,
            },
            rollback: None,
        });
    }
    let rollback = Rollback {
        current: current.to_path_buf(),
        backup,
    };
    tracing::debug!(
        "moved {} to {}",
        current.display(),
        rollback.backup.display()
    );

    // Steps 2 and 3.
    let installed = match mode {
        ReplaceMode::Copy => copy_into(candidate, current),
        ReplaceMode::Link => link_to(candidate, current),
    };

    match installed {
        Ok(()) => {
            tracing::info!(
                "replaced {} with {} ({mode})",
                current.display(),
                candidate.display()
            );
            Ok(Swapped { rollback, mode })
        }
        Err(source) => Err(ReplaceError {
            current: current.to_path_buf(),
            source,
            rollback: Some(rollback),
        }),
    }
}

fn copy_into(candidate: &Path, current: &Path) -> Result<(), SwapError> {
    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(EXECUTABLE_MODE)
        .open(current)
        .map_err(|e| io_err(current, e))?;
    let mut input = File::open(candidate).map_err(|e| io_err(candidate, e))?;

    io::copy(&mut input, &mut output).map_err(|e| io_err(current, e))?;
    output.sync_all().map_err(|e| io_err(current, e))?;

    fs::set_permissions(current, Permissions::from_mode(EXECUTABLE_MODE))
        .map_err(|e| io_err(current, e))
}

fn link_to(candidate: &Path, current: &Path) -> Result<(), SwapError> {
    // A relative target would resolve against the link's directory, not ours.
    let target = fs::canonicalize(candidate).map_err(|e| io_err(candidate, e))?;
    fs::set_permissions(&target, Permissions::from_mode(EXECUTABLE_MODE))
        .map_err(|e| io_err(&target, e))?;
    std::os::unix::fs::symlink(&target, current).map_err(|e| io_err(current, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/opt/app/server")),
            PathBuf::from("/opt/app/server.bak")
        );
        assert_eq!(
            backup_path(Path::new("server.v2")),
            PathBuf::from("server.v2.bak")
        );
    }

    #[test]
    fn missing_executable_yields_no_rollback() {
        let dir = TempDir::new().unwrap();
        let candidate = dir.path().join("candidate");
        fs::write(&candidate, b"new").unwrap();

        let err = replace(&dir.path().join("absent"), &candidate, ReplaceMode::Copy).unwrap_err();
        assert!(err.rollback.is_none());
        assert!(matches!(err.source, SwapError::Backup { .. }), "got: {err}");
        assert!(!backup_path(&dir.path().join("absent")).exists());
    }

    #[test]
    fn discard_backup_removes_bak_file() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("app");
        let candidate = dir.path().join("candidate");
        fs::write(&exe, b"old").unwrap();
        fs::write(&candidate, b"new").unwrap();

        let swapped = replace(&exe, &candidate, ReplaceMode::Copy).expect("replace");
        let backup = swapped.rollback.backup().to_path_buf();
        assert!(backup.exists());

        swapped.discard_backup().expect("discard");
        assert!(!backup.exists());
        assert_eq!(fs::read(&exe).unwrap(), b"new");
    }
}

use std::ffi::{OsStr, OsString};
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use molt_core::UpdaterConfig;

use crate::error::{io_err, DaemonError};

/// Descriptor slot the child finds its channel endpoint at: the first one
/// after stdin, stdout and stderr.
pub const CHANNEL_FD: RawFd = 3;

/// Parent-side read deadline; bounds how long cancellation can go unnoticed.
pub const PARENT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// The executable this process should replace and relaunch.
///
/// The configured override wins. Otherwise it is the path the process was
/// invoked by, symlinks left unresolved: after a link-mode swap that path is
/// the link itself, not the candidate behind it. The OS-reported image path
/// is the last resort.
pub fn current_executable(config: &UpdaterConfig) -> Result<PathBuf, DaemonError> {
    if let Some(path) = config.executable() {
        return Ok(path.to_path_buf());
    }

    let cwd = std::env::current_dir().map_err(|e| io_err("current directory", e))?;
    let search = std::env::var_os("PATH");
    let invoked = std::env::args_os()
        .next()
        .and_then(|arg0| invoked_executable(&arg0, &cwd, search.as_deref()));
    match invoked {
        Some(path) => Ok(path),
        None => std::env::current_exe().map_err(|e| io_err("current executable", e)),
    }
}

/// Absolute path for `arg0`: joined onto `cwd` when it names a path, looked
/// up in `search` when it is a bare command name.
pub fn invoked_executable(arg0: &OsStr, cwd: &Path, search: Option<&OsStr>) -> Option<PathBuf> {
    if arg0.is_empty() {
        return None;
    }
    let named = Path::new(arg0);
    if named.components().count() > 1 || named.is_absolute() {
        return Some(cwd.join(named));
    }

    let search: OsString = search?.to_os_string();
    std::env::split_paths(&search)
        .map(|dir| cwd.join(dir).join(named))
        .find(|candidate| candidate.is_file())
}

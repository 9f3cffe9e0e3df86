//! Self-update runtime: role selection, parent supervision, the update
//! daemon's check-replace-relaunch cycle, and the single-process mode.

pub mod channel;
pub mod daemon;
mod error;
pub mod fetch;
pub mod paths;
mod runtime;
pub mod simple;
pub mod startup;
pub mod supervisor;

pub use channel::{Endpoint, Event};
pub use daemon::{CycleOutcome, DaemonExit, UpdateDaemon};
pub use error::{CycleError, DaemonError};
pub use fetch::{fetch_candidate, FetchOutcome};
pub use runtime::{init_tracing, start_blocking, start_simple_blocking, Exit, Updater};
pub use simple::SimpleUpdater;
pub use startup::{role_arg, Invocation};

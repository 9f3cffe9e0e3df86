//! `molt rollback`: undo a swap by hand.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use molt_swap::Rollback;

#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Executable whose `.bak` should be put back.
    pub exe: PathBuf,
}

impl RollbackArgs {
    pub fn run(self) -> Result<()> {
        let rollback = Rollback::for_executable(&self.exe);
        if rollback.backup().symlink_metadata().is_err() {
            bail!("no backup found at {}", rollback.backup().display());
        }
        rollback
            .run()
            .with_context(|| format!("failed to restore {}", self.exe.display()))?;
        println!("restored {} from {}", self.exe.display(), rollback.backup().display());
        Ok(())
    }
}

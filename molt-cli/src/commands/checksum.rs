//! `molt checksum`: digest of a build as published in the release metadata.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::provider::sha256_file;

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Build to hash.
    pub file: PathBuf,
}

impl ChecksumArgs {
    pub fn run(self) -> Result<()> {
        let digest = sha256_file(&self.file)
            .with_context(|| format!("failed to hash {}", self.file.display()))?;
        println!("{digest}  {}", self.file.display());
        Ok(())
    }
}

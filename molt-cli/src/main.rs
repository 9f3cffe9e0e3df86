//! molt: a self-updating service host.
//!
//! # Usage
//!
//! ```text
//! molt run --config <release.json> [--interval <secs>] [--link] [--simple]
//! molt checksum <file>
//! molt rollback <exe>
//! ```
//!
//! `molt run` starts the heartbeat workload under the updater. The update
//! daemon is the same binary started with the hidden `--update=true` flag.

mod commands;
mod provider;

use anyhow::{bail, Result};
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};

use commands::{checksum::ChecksumArgs, rollback::RollbackArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "molt",
    version,
    about = "Run a service that replaces its own executable when a new build is published",
    long_about = None,
)]
struct Cli {
    /// Set on the update daemon by its parent.
    #[arg(
        long = "update",
        hide = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
    )]
    update: Option<bool>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the heartbeat service under the updater.
    Run(RunArgs),

    /// Print the SHA-256 digest to publish for a build.
    Checksum(ChecksumArgs),

    /// Restore `<exe>.bak` over `<exe>` after an interrupted update.
    Rollback(RollbackArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.update == Some(true) && !matches!(cli.command, Commands::Run(_)) {
        bail!("the update daemon only runs under `molt run`");
    }
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Checksum(args) => args.run(),
        Commands::Rollback(args) => args.run(),
    }
}

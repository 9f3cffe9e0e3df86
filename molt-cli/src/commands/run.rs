//! `molt run`: the heartbeat service under the updater.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use molt_core::{ReplaceMode, UpdaterConfig};
use molt_daemon::{start_blocking, start_simple_blocking, Updater};

use crate::provider::{built_in_version, HttpRepo, SourceConfig};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Release source JSON with `baseUrl`, `currentVersion` and `repoName`.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Overrides `baseUrl`.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Overrides `currentVersion`, which defaults to this build's version.
    #[arg(long)]
    pub current_version: Option<String>,

    /// Overrides `repoName`.
    #[arg(long)]
    pub repo_name: Option<String>,

    /// Seconds between update checks.
    #[arg(long, default_value_t = 60)]
    pub interval: u64,

    /// Seconds between heartbeat log lines.
    #[arg(long, default_value_t = 10)]
    pub heartbeat: u64,

    /// Where candidate builds are downloaded.
    #[arg(long, default_value = molt_core::config::DEFAULT_DOWNLOAD_DIR)]
    pub download_dir: PathBuf,

    /// Symlink the executable to the downloaded build instead of copying it.
    #[arg(long)]
    pub link: bool,

    /// Do not start the new build after replacing the executable.
    #[arg(long)]
    pub no_relaunch: bool,

    /// Single-process mode: download and verify only, never replace.
    #[arg(long)]
    pub simple: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let source = self.source()?;
        if self.interval == 0 {
            bail!("--interval must be at least 1 second");
        }
        let version = source.current_version.clone();
        let heartbeat = Duration::from_secs(self.heartbeat.max(1));

        let mut builder = UpdaterConfig::builder(Duration::from_secs(self.interval))
            .download_dir(&self.download_dir)
            .relaunch(!self.no_relaunch)
            .workload(serve_heartbeat(version, heartbeat));
        if self.link {
            builder = builder.replace_mode(ReplaceMode::Link);
        }
        builder = if self.simple {
            builder.ready_notifier(|candidate: Option<&Path>| {
                if let Some(path) = candidate {
                    tracing::info!(
                        path = %path.display(),
                        "new build verified; restart with it to upgrade",
                    );
                }
            })
        } else {
            builder.ready_notifier(|_: Option<&Path>| {
                tracing::info!("handing the executable over to the update daemon");
            })
        };
        let config = builder.build().context("invalid updater configuration")?;

        let updater = Updater::new(config, HttpRepo::new(source));
        if self.simple {
            start_simple_blocking(updater.into_simple()).context("updater exited with error")
        } else {
            start_blocking(updater).context("updater exited with error")
        }
    }

    fn source(&self) -> Result<SourceConfig> {
        let loaded = match &self.config {
            Some(path) => Some(SourceConfig::load(path)?),
            None => None,
        };
        let pick = |flag: &Option<String>, from_file: Option<&String>, name: &str| {
            flag.clone()
                .or_else(|| from_file.cloned())
                .with_context(|| format!("missing {name}: pass --config or --{}", kebab(name)))
        };
        Ok(SourceConfig {
            base_url: pick(&self.base_url, loaded.as_ref().map(|c| &c.base_url), "baseUrl")?,
            current_version: self
                .current_version
                .clone()
                .or_else(|| loaded.as_ref().map(|c| c.current_version.clone()))
                .unwrap_or_else(built_in_version),
            repo_name: pick(&self.repo_name, loaded.as_ref().map(|c| &c.repo_name), "repoName")?,
        })
    }
}

fn kebab(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 2);
    for ch in camel.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

async fn serve_heartbeat(version: String, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut beats: u64 = 0;
    loop {
        ticker.tick().await;
        beats += 1;
        tracing::info!(%version, pid = std::process::id(), beats, "heartbeat");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> RunArgs {
        use clap::Parser;

        #[derive(Parser)]
        struct Harness {
            #[command(flatten)]
            run: RunArgs,
        }

        let argv = std::iter::once("molt").chain(extra.iter().copied());
        Harness::parse_from(argv).run
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("release.json");
        std::fs::write(
            &path,
            r#"{"baseUrl":"https://a.example","currentVersion":"1.0.0","repoName":"svc"}"#,
        )
        .unwrap();
        let path = path.to_string_lossy().into_owned();

        let source = args(&["--config", &path, "--current-version", "2.0.0"])
            .source()
            .unwrap();
        assert_eq!(source.base_url, "https://a.example");
        assert_eq!(source.current_version, "2.0.0");
        assert_eq!(source.repo_name, "svc");
    }

    #[test]
    fn missing_source_fields_name_the_flag() {
        let err = args(&["--base-url", "https://a.example"]).source().unwrap_err();
        assert!(err.to_string().contains("--repo-name"), "{err}");
    }

    #[test]
    fn current_version_defaults_to_this_build() {
        let source = args(&["--base-url", "https://a.example", "--repo-name", "svc"])
            .source()
            .unwrap();
        assert_eq!(source.current_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn kebab_converts_camel_case() {
        assert_eq!(kebab("baseUrl"), "base-url");
        assert_eq!(kebab("currentVersion"), "current-version");
    }
}

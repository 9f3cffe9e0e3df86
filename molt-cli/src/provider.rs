//! HTTP release source.
//!
//! `GET {baseUrl}/{repoName}/latest` answers with
//! `{ "version": "...", "url": "...", "sha256": "..." }`. A release is an
//! update when its version differs from the running one.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use molt_core::{DownloadSink, Provider, ProviderError, ValidationSource};

/// Largest artifact accepted from a release URL by default.
pub const MAX_ARTIFACT_BYTES: u64 = 512 * 1024 * 1024;

const CHUNK_BYTES: usize = 64 * 1024;

type Chunk = Result<Vec<u8>, ProviderError>;

/// Release source settings, as stored in the JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub base_url: String,
    /// Defaults to the version this binary was built as, so a relaunched
    /// build compares against itself.
    #[serde(default = "built_in_version")]
    pub current_version: String,
    pub repo_name: String,
}

impl SourceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid release config {}", path.display()))
    }

    pub fn latest_url(&self) -> String {
        format!(
            "{}/{}/latest",
            self.base_url.trim_end_matches('/'),
            self.repo_name
        )
    }
}

pub fn built_in_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Metadata of the newest published build.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LatestRelease {
    pub version: String,
    pub url: String,
    pub sha256: String,
}

pub struct HttpRepo {
    source: SourceConfig,
    agent: ureq::Agent,
    max_artifact_bytes: u64,
}

impl HttpRepo {
    pub fn new(source: SourceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(60))
            .build();
        Self {
            source,
            agent,
            max_artifact_bytes: MAX_ARTIFACT_BYTES,
        }
    }

    pub fn with_max_artifact_bytes(mut self, limit: u64) -> Self {
        self.max_artifact_bytes = limit;
        self
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }
}

#[async_trait]
impl Provider for HttpRepo {
    type Session = Option<LatestRelease>;

    fn new_session(&self) -> Self::Session {
        None
    }

    async fn check_update(
        &self,
        cancel: &CancellationToken,
        session: &mut Self::Session,
    ) -> Result<bool, ProviderError> {
        let agent = self.agent.clone();
        let url = self.source.latest_url();
        let latest: LatestRelease = blocking(cancel, move || {
            agent
                .get(&url)
                .call()
                .map_err(transport)?
                .into_json()
                .map_err(|e| ProviderError::transport(format!("malformed release metadata: {e}")))
        })
        .await?;

        let available = latest.version != self.source.current_version;
        tracing::info!(
            current = %self.source.current_version,
            latest = %latest.version,
            available,
            "checked for update",
        );
        *session = Some(latest);
        Ok(available)
    }

    async fn download(
        &self,
        cancel: &CancellationToken,
        session: &mut Self::Session,
        sink: &mut DownloadSink,
    ) -> Result<(), ProviderError> {
        let latest = session
            .as_ref()
            .ok_or_else(|| ProviderError::Other("download without a checked release".into()))?;
        let agent = self.agent.clone();
        let url = latest.url.clone();
        let limit = self.max_artifact_bytes;
        let (tx, mut rx) = mpsc::channel::<Chunk>(4);
        let fetch = tokio::task::spawn_blocking(move || {
            if let Err(err) = stream_body(&agent, &url, limit, &tx) {
                let _ = tx.blocking_send(Err(err));
            }
        });

        let mut written: u64 = 0;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                chunk = rx.recv() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    sink.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }
        fetch
            .await
            .map_err(|e| ProviderError::Other(format!("http task failed: {e}")))?;

        tracing::info!(bytes = written, url = %latest.url, "artifact downloaded");
        Ok(())
    }

    async fn validate_download(
        &self,
        _cancel: &CancellationToken,
        session: &Self::Session,
        source: &mut ValidationSource,
    ) -> Result<(), ProviderError> {
        let latest = session
            .as_ref()
            .ok_or_else(|| ProviderError::Other("validate without a checked release".into()))?;

        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let actual = hex::encode(hasher.finalize());

        if !actual.eq_ignore_ascii_case(latest.sha256.trim()) {
            return Err(ProviderError::Integrity {
                expected: latest.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Hex SHA-256 of a file on disk.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Read the artifact at `url` in chunks and hand them to `tx`. Stops quietly
/// once the receiving side is gone.
fn stream_body(
    agent: &ureq::Agent,
    url: &str,
    limit: u64,
    tx: &mpsc::Sender<Chunk>,
) -> Result<(), ProviderError> {
    let mut reader = agent.get(url).call().map_err(transport)?.into_reader();
    let mut received: u64 = 0;
    loop {
        let mut buf = vec![0u8; CHUNK_BYTES];
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(ProviderError::transport(err.to_string())),
        };
        received += n as u64;
        if received > limit {
            return Err(ProviderError::TooLarge { limit });
        }
        buf.truncate(n);
        if tx.blocking_send(Ok(buf)).is_err() {
            return Ok(());
        }
    }
}

/// Run blocking HTTP work off the runtime, giving up on cancellation.
async fn blocking<T, F>(cancel: &CancellationToken, work: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        joined = task => {
            joined.map_err(|e| ProviderError::Other(format!("http task failed: {e}")))?
        }
    }
}

fn transport(err: ureq::Error) -> ProviderError {
    ProviderError::transport(err.to_string())
}

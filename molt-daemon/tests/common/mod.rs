#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use molt_core::{DownloadSink, Provider, ProviderError, ValidationSource};
use molt_daemon::channel::{self, Endpoint};

/// Provider serving one fixed build from memory.
#[derive(Debug, Default)]
pub struct FakeRepo {
    pub available: bool,
    pub payload: Vec<u8>,
    /// Write something other than `payload` so validation fails.
    pub tamper: bool,
    pub checks: Arc<AtomicUsize>,
}

impl FakeRepo {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn serving(payload: &[u8]) -> Self {
        Self {
            available: true,
            payload: payload.to_vec(),
            ..Self::default()
        }
    }

    pub fn tampered(payload: &[u8]) -> Self {
        Self {
            tamper: true,
            ..Self::serving(payload)
        }
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FakeRepo {
    type Session = Option<Vec<u8>>;

    fn new_session(&self) -> Self::Session {
        None
    }

    async fn check_update(
        &self,
        _cancel: &CancellationToken,
        session: &mut Self::Session,
    ) -> Result<bool, ProviderError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.available {
            *session = Some(self.payload.clone());
        }
        Ok(self.available)
    }

    async fn download(
        &self,
        _cancel: &CancellationToken,
        session: &mut Self::Session,
        sink: &mut DownloadSink,
    ) -> Result<(), ProviderError> {
        let expected = session
            .as_ref()
            .ok_or_else(|| ProviderError::Other("download before check".into()))?;
        if self.tamper {
            sink.write_all(b"not the build").await?;
        } else {
            sink.write_all(expected).await?;
        }
        Ok(())
    }

    async fn validate_download(
        &self,
        _cancel: &CancellationToken,
        session: &Self::Session,
        source: &mut ValidationSource,
    ) -> Result<(), ProviderError> {
        let expected = session
            .as_ref()
            .ok_or_else(|| ProviderError::Other("validate before check".into()))?;
        let mut actual = Vec::new();
        source.read_to_end(&mut actual).await?;
        if &actual != expected {
            return Err(ProviderError::Integrity {
                expected: format!("{} bytes", expected.len()),
                actual: format!("{} bytes", actual.len()),
            });
        }
        Ok(())
    }
}

/// Connected `(parent, child)` endpoints inside the current runtime.
pub fn endpoints() -> (Endpoint, Endpoint) {
    let (parent, child) = channel::pair(true).expect("socket pair");
    (
        Endpoint::from_std(parent).expect("parent endpoint"),
        Endpoint::from_std(child).expect("child endpoint"),
    )
}

/// Write an executable shell script.
pub fn script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

/// Script body that writes `tag` into the file named by its first argument.
pub fn marker_script(tag: &str) -> String {
    format!("#!/bin/sh\nprintf '{tag}' > \"$1\"\n")
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.expect("dir entry").path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Poll until `path` exists with content, or give up after a few seconds.
pub async fn wait_for_file(path: &Path) -> Option<String> {
    for _ in 0..100 {
        if let Ok(content) = fs::read_to_string(path) {
            if !content.is_empty() {
                return Some(content);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

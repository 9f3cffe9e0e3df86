//! The release-source contract consumed by the update machinery.
//!
//! A provider knows how to tell whether a newer build exists, how to stream
//! it, and how to verify what was streamed. The daemon never looks inside a
//! [`Provider::Session`]; it only threads it through one check cycle.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Where a provider writes the downloaded artifact.
pub type DownloadSink = dyn AsyncWrite + Unpin + Send;

/// Where a provider reads the downloaded artifact back for verification.
pub type ValidationSource = dyn AsyncRead + Unpin + Send;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Per-cycle state, e.g. the resolved metadata of the candidate release.
    type Session: Send + Sync;

    /// Called at the start of every check cycle.
    fn new_session(&self) -> Self::Session;

    /// Called at the end of every check cycle, whatever its outcome.
    fn free_session(&self, session: Self::Session) {
        drop(session);
    }

    /// Report whether a newer build is available.
    async fn check_update(
        &self,
        cancel: &CancellationToken,
        session: &mut Self::Session,
    ) -> Result<bool, ProviderError>;

    /// Stream the new build into `sink`.
    async fn download(
        &self,
        cancel: &CancellationToken,
        session: &mut Self::Session,
        sink: &mut DownloadSink,
    ) -> Result<(), ProviderError>;

    /// Verify the bytes produced by [`Provider::download`], read back from the
    /// start of the candidate file.
    async fn validate_download(
        &self,
        cancel: &CancellationToken,
        session: &Self::Session,
        source: &mut ValidationSource,
    ) -> Result<(), ProviderError>;
}

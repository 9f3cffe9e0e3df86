//! Check, approve, download, validate: the first half of every update cycle,
//! shared by the respawning daemon and the single-process updater.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use molt_core::{Provider, UpdaterConfig};
use molt_swap::{create_candidate, discard_candidate};

use crate::error::CycleError;

/// Where the first half of a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The provider has nothing newer.
    NoUpdate,
    /// The download gate turned the update down.
    Declined,
    /// A downloaded and verified candidate is on disk.
    Ready(PathBuf),
}

/// Check, approve, download and validate with a fresh session. The session
/// is released whatever happens.
pub async fn fetch_candidate<P>(
    provider: &P,
    config: &UpdaterConfig,
    cancel: &CancellationToken,
) -> Result<FetchOutcome, CycleError>
where
    P: Provider + ?Sized,
{
    let mut session = provider.new_session();
    let outcome = fetch_with_session(provider, config, cancel, &mut session).await;
    provider.free_session(session);
    outcome
}

async fn fetch_with_session<P>(
    provider: &P,
    config: &UpdaterConfig,
    cancel: &CancellationToken,
    session: &mut P::Session,
) -> Result<FetchOutcome, CycleError>
where
    P: Provider + ?Sized,
{
    // Checking.
    let available = provider
        .check_update(cancel, session)
        .await
        .map_err(|e| CycleError::from_provider(e, CycleError::Check))?;
    if !available {
        return Ok(FetchOutcome::NoUpdate);
    }

    // Approving.
    if !config.download_gate().should_download() {
        return Ok(FetchOutcome::Declined);
    }

    // Downloading.
    let name = config.name_policy().generate_name()?;
    let (file, path) = create_candidate(config.download_dir(), &name)?;
    let mut file = File::from_std(file);
    tracing::info!(path = %path.display(), "downloading update");

    if let Err(err) = download_and_validate(provider, cancel, session, &mut file).await {
        drop(file);
        discard_candidate(&path);
        return Err(err);
    }

    tracing::info!(path = %path.display(), "update downloaded and verified");
    Ok(FetchOutcome::Ready(path))
}

async fn download_and_validate<P>(
    provider: &P,
    cancel: &CancellationToken,
    session: &mut P::Session,
    file: &mut File,
) -> Result<(), CycleError>
where
    P: Provider + ?Sized,
{
    provider
        .download(cancel, session, file)
        .await
        .map_err(|e| CycleError::from_provider(e, CycleError::Download))?;
    file.flush()
        .await
        .map_err(|e| CycleError::Download(e.into()))?;
    file.sync_all()
        .await
        .map_err(|e| CycleError::Download(e.into()))?;

    // Validating: read back from the start.
    file.rewind()
        .await
        .map_err(|e| CycleError::Validate(e.into()))?;
    provider
        .validate_download(cancel, session, file)
        .await
        .map_err(|e| CycleError::from_provider(e, CycleError::Validate))
}


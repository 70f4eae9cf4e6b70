//! Ingestion services
//!
//! - `provider_client`: resumable upload handshake + status checks
//! - `readiness_poller`: fixed-interval polling until the provider is done
//! - `progress_emitter`: ordered, single-terminal event writer
//! - `url_policy` / `remote_fetch`: URL-import admission and download
//! - `ingestion_pipeline`: one pipeline over every [`ByteSource`]
//! - `direct_grant`: session credentials for browser-direct uploads

pub mod byte_source;
pub mod direct_grant;
pub mod ingestion_pipeline;
pub mod metadata_persister;
pub mod progress_emitter;
pub mod provider_client;
pub mod readiness_poller;
pub mod remote_fetch;
pub mod url_policy;

pub use byte_source::ByteSource;
pub use direct_grant::{
    is_provider_file_name, issue_direct_grant, DirectGrantRequest, DirectUploadGrant, GrantRegistry,
    IssuedGrant,
};
pub use ingestion_pipeline::IngestionPipeline;
pub use metadata_persister::MetadataPersister;
pub use progress_emitter::ProgressEmitter;
pub use provider_client::{FileProvider, ProviderClient, UploadRequest, UploadSession};
pub use readiness_poller::{PollPolicy, PollSummary, ReadinessPoller};
pub use remote_fetch::{FetchedMedia, RemoteFetcher};
pub use url_policy::UrlPolicy;

use crate::error::IngestError;
use crate::models::{IngestionJob, JobState};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Advance `job` and log the transition
pub(crate) fn advance_job(job: &mut IngestionJob, new_state: JobState) -> Result<(), IngestError> {
    let transition = job.advance(new_state)?;
    debug!(
        job_id = %transition.job_id,
        from = ?transition.old_state,
        to = ?transition.new_state,
        at = %transition.transitioned_at,
        "Job state changed"
    );
    Ok(())
}

/// Run `fut` unless the job is cancelled first
///
/// Every suspension point of a job goes through here, so a disconnected
/// consumer stops the job at its next network call or poll sleep.
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, IngestError>
where
    F: Future<Output = Result<T, IngestError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IngestError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), IngestError> = cancellable(&cancel, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(IngestError::Cancelled)));
    }

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let result = cancellable(&cancel, async { Ok::<_, IngestError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

//! Readiness poller
//!
//! After finalize the provider keeps processing the file. The poller checks
//! its state at a fixed interval:
//! - ACTIVE → ready, stop
//! - FAILED → processing failure, stop immediately
//! - PROCESSING or anything unrecognized → wait one interval, check again
//!
//! After `max_attempts` checks without a terminal answer the job times out.
//! No sleep follows the last check. A failed status request ends the job;
//! it is not retried.

use crate::error::IngestError;
use crate::models::{IngestionJob, JobState, MediaKind, ProviderFileState, ProviderFileStatus};
use crate::services::progress_emitter::ProgressEmitter;
use crate::services::provider_client::FileProvider;
use crate::services::{advance_job, cancellable};
use mip_common::events::{processing_percent, ProgressPhase};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 60,
        }
    }
}

/// How a successful poll went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub attempts: u32,
    pub waited: Duration,
    /// The ACTIVE answer that ended the poll
    pub file: ProviderFileStatus,
}

/// Polls one finalized file until it settles
pub struct ReadinessPoller<'a> {
    provider: &'a dyn FileProvider,
    policy: PollPolicy,
}

impl<'a> ReadinessPoller<'a> {
    pub fn new(provider: &'a dyn FileProvider, policy: PollPolicy) -> Self {
        Self { provider, policy }
    }

    /// Poll until the provider reports ACTIVE
    ///
    /// Moves the job into `Polling` and keeps `attempt_count` current. The
    /// terminal job state is left to the caller.
    pub async fn wait_until_ready(
        &self,
        job: &mut IngestionJob,
        emitter: &mut ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<PollSummary, IngestError> {
        let handle = job.provider_file.clone().ok_or_else(|| {
            IngestError::Internal("readiness polling started before finalize".to_string())
        })?;
        let noun = job
            .mime_type
            .as_deref()
            .map(MediaKind::from_mime)
            .unwrap_or(MediaKind::Video)
            .noun();
        let max_attempts = self.policy.max_attempts.max(1);
        let started = Instant::now();

        for attempt in 1..=max_attempts {
            if job.state != JobState::Polling {
                advance_job(job, JobState::Polling)?;
            }
            job.attempt_count = attempt;

            emitter
                .progress(
                    ProgressPhase::Processing,
                    format!("Processing {}... ({}/{})", noun, attempt, max_attempts),
                    processing_percent(attempt, max_attempts),
                )
                .await;

            let status = cancellable(cancel, self.provider.file_status(&handle)).await?;
            debug!(
                job_id = %job.job_id,
                provider_file = %handle.name,
                attempt,
                state = ?status.state,
                "Provider status check"
            );

            match &status.state {
                ProviderFileState::Active => {
                    return Ok(PollSummary {
                        attempts: attempt,
                        waited: started.elapsed(),
                        file: status,
                    });
                }
                ProviderFileState::Failed => {
                    return Err(IngestError::ProcessingFailed(format!(
                        "provider reported FAILED for {} on status check {}",
                        handle.name, attempt
                    )));
                }
                ProviderFileState::Unrecognized(raw) => {
                    warn!(job_id = %job.job_id, state = %raw, "Unrecognized provider state, treating as processing");
                }
                ProviderFileState::Processing => {}
            }

            if attempt < max_attempts {
                cancellable(cancel, async {
                    tokio::time::sleep(self.policy.interval).await;
                    Ok(())
                })
                .await?;
            }
        }

        Err(IngestError::ProcessingTimeout {
            attempts: max_attempts,
            waited: started.elapsed(),
        })
    }
}

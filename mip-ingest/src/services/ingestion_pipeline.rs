//! Ingestion pipeline
//!
//! One pipeline serves all three input modes:
//! 1. Validate the source and obtain the bytes (buffer, download) or the
//!    provider handle (direct)
//! 2. Init + transfer/finalize with the provider (skipped for direct)
//! 3. Poll readiness; for direct uploads, check the provider's description
//!    of the file against the grant
//! 4. Persist the record
//!
//! Every outcome, success or any error from any step, goes through
//! [`IngestionPipeline::finish`], which owns the terminal event.

use crate::error::IngestError;
use crate::models::media::SERVER_UPLOAD_MAX_BYTES;
use crate::models::{IngestionJob, JobState, PersistedFileRecord, ProviderFileHandle, ProviderFileStatus};
use crate::services::byte_source::ByteSource;
use crate::services::direct_grant::{is_provider_file_name, IssuedGrant};
use crate::services::{advance_job, cancellable};
use crate::services::metadata_persister::MetadataPersister;
use crate::services::progress_emitter::ProgressEmitter;
use crate::services::provider_client::{FileProvider, UploadRequest};
use crate::services::readiness_poller::{PollPolicy, ReadinessPoller};
use crate::services::remote_fetch::RemoteFetcher;
use crate::services::url_policy::UrlPolicy;
use axum::body::Bytes;
use chrono::Utc;
use mip_common::events::ProgressPhase;
use mip_common::human_size::format_bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Bytes in hand, ready for the provider handshake
struct Payload {
    bytes: Bytes,
    mime_type: String,
    display_name: String,
}

pub struct IngestionPipeline {
    provider: Arc<dyn FileProvider>,
    persister: Arc<dyn MetadataPersister>,
    fetcher: RemoteFetcher,
    url_policy: UrlPolicy,
    poll_policy: PollPolicy,
}

impl IngestionPipeline {
    pub fn new(
        provider: Arc<dyn FileProvider>,
        persister: Arc<dyn MetadataPersister>,
        fetcher: RemoteFetcher,
        url_policy: UrlPolicy,
        poll_policy: PollPolicy,
    ) -> Self {
        Self {
            provider,
            persister,
            fetcher,
            url_policy,
            poll_policy,
        }
    }

    pub fn provider(&self) -> &dyn FileProvider {
        self.provider.as_ref()
    }

    /// Drive one job to its terminal state; returns the finished job
    pub async fn run(
        &self,
        mut job: IngestionJob,
        source: ByteSource,
        mut emitter: ProgressEmitter,
        cancel: CancellationToken,
    ) -> IngestionJob {
        let span = job_span(&job);
        async move {
            info!("Ingestion job started");
            let result = self.execute(&mut job, source, &mut emitter, &cancel).await;
            self.finish(job, result, emitter).await
        }
        .instrument(span)
        .await
    }

    /// Fail a job whose input was refused before it could start
    pub async fn reject(
        &self,
        job: IngestionJob,
        err: IngestError,
        emitter: ProgressEmitter,
    ) -> IngestionJob {
        let span = job_span(&job);
        self.finish(job, Err(err), emitter).instrument(span).await
    }

    async fn execute(
        &self,
        job: &mut IngestionJob,
        source: ByteSource,
        emitter: &mut ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<PersistedFileRecord, IngestError> {
        emitter
            .status(ProgressPhase::Validating, "Validating file...")
            .await;

        let mut direct_grant = None;
        match source {
            ByteSource::ServerBuffer {
                bytes,
                mime_type,
                display_name,
            } => {
                let payload = validate_buffer(bytes, mime_type, display_name, job)?;
                self.upload(job, payload, emitter, cancel).await?;
            }
            ByteSource::RemoteUrl { url, title } => {
                let url = self.url_policy.check(&url)?;
                emitter
                    .status(ProgressPhase::Downloading, "Downloading from URL...")
                    .await;
                let fetched = self
                    .fetcher
                    .fetch(&url, title.as_deref(), emitter, cancel)
                    .await?;
                let payload = Payload {
                    bytes: fetched.bytes,
                    mime_type: fetched.mime_type,
                    display_name: fetched.display_name,
                };
                self.upload(job, payload, emitter, cancel).await?;
            }
            ByteSource::BrowserDirect { file_name, grant } => {
                adopt_direct_upload(job, file_name, &grant)?;
                direct_grant = Some(grant);
            }
        }

        let poller = ReadinessPoller::new(self.provider.as_ref(), self.poll_policy);
        let summary = poller.wait_until_ready(job, emitter, cancel).await?;
        if let Some(grant) = &direct_grant {
            confirm_direct_upload(job, &summary.file, grant)?;
        }
        advance_job(job, JobState::Ready)?;
        info!(
            attempts = summary.attempts,
            waited_ms = summary.waited.as_millis() as u64,
            "Provider reports file ready"
        );

        emitter
            .status(ProgressPhase::Persisting, "Saving file metadata...")
            .await;
        let record = PersistedFileRecord::from_ready_job(job, Utc::now()).ok_or_else(|| {
            IngestError::Internal("ready job is missing record fields".to_string())
        })?;

        let inserted = self.persister.persist(&record).await.map_err(|e| {
            error!(
                provider_file = %record.provider_file_id,
                error = %e,
                "Persist failed; provider file is now untracked"
            );
            IngestError::Persistence(e.to_string())
        })?;
        if !inserted {
            warn!("File record already existed; kept the original");
        }

        Ok(record)
    }

    /// Init, then transfer+finalize
    async fn upload(
        &self,
        job: &mut IngestionJob,
        payload: Payload,
        emitter: &mut ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let size = payload.bytes.len() as u64;
        job.raw_byte_length = Some(size);
        job.mime_type = Some(payload.mime_type.clone());
        job.display_name = Some(payload.display_name.clone());
        job.sha256 = Some(format!("{:x}", Sha256::digest(&payload.bytes)));

        emitter
            .status(ProgressPhase::Initializing, "Starting upload...")
            .await;
        let request = UploadRequest {
            display_name: payload.display_name,
            mime_type: payload.mime_type,
            size_bytes: size,
        };
        let session = cancellable(cancel, self.provider.start_upload(&request)).await?;
        advance_job(job, JobState::Initialized)?;

        emitter
            .status(
                ProgressPhase::Transferring,
                format!("Uploading {} to the processing service...", format_bytes(size)),
            )
            .await;
        let handle = cancellable(
            cancel,
            self.provider.upload_and_finalize(&session, payload.bytes),
        )
        .await?;
        advance_job(job, JobState::Transferred)?;

        info!(provider_file = %handle.name, size_bytes = size, "Upload finalized");
        job.attach_provider_file(handle);
        advance_job(job, JobState::Finalized)?;
        Ok(())
    }

    /// The single outcome funnel
    async fn finish(
        &self,
        mut job: IngestionJob,
        result: Result<PersistedFileRecord, IngestError>,
        emitter: ProgressEmitter,
    ) -> IngestionJob {
        match result {
            Ok(record) => {
                info!(
                    provider_file = %record.provider_file_id,
                    size_bytes = record.size_bytes,
                    consumer_connected = !emitter.consumer_gone(),
                    "Ingestion job complete"
                );
                emitter.succeed(&record).await;
            }
            Err(err) => {
                if !job.is_terminal() {
                    let terminal = match err {
                        IngestError::ProcessingTimeout { .. } => JobState::Timeout,
                        IngestError::Cancelled => JobState::Cancelled,
                        _ => JobState::Failed,
                    };
                    // Failed/Cancelled are always legal; Timeout comes only from polling
                    let _ = advance_job(&mut job, terminal);
                }

                match &err {
                    IngestError::Cancelled => {
                        info!("Consumer disconnected; job cancelled");
                    }
                    IngestError::Validation(msg) => {
                        info!(kind = err.kind(), reason = %msg, "Ingestion rejected");
                    }
                    _ => {
                        warn!(
                            kind = err.kind(),
                            retryable = err.is_retryable(),
                            attempts = job.attempt_count,
                            error = %err,
                            "Ingestion job failed"
                        );
                    }
                }
                emitter.fail(&err).await;
            }
        }
        job
    }
}

fn job_span(job: &IngestionJob) -> tracing::Span {
    info_span!(
        "ingest_job",
        job_id = %job.job_id,
        tenant = %job.tenant,
        mode = job.source_mode.as_str()
    )
}

fn validate_buffer(
    bytes: Bytes,
    mime_type: String,
    display_name: Option<String>,
    job: &IngestionJob,
) -> Result<Payload, IngestError> {
    let size = bytes.len() as u64;
    if size == 0 {
        return Err(IngestError::Validation("The file is empty.".to_string()));
    }
    if size > SERVER_UPLOAD_MAX_BYTES {
        return Err(IngestError::too_large("The file", size, SERVER_UPLOAD_MAX_BYTES));
    }
    let mime_type = mime_type.trim().to_string();
    if mime_type.is_empty() {
        return Err(IngestError::Validation("A MIME type is required.".to_string()));
    }

    let display_name = display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| job.display_name_or_default());

    Ok(Payload {
        bytes,
        mime_type,
        display_name,
    })
}

/// Take over a file the browser already finalized with the provider
///
/// Size, MIME type and name come from the grant; the URI stays unknown
/// until the provider describes the file.
fn adopt_direct_upload(
    job: &mut IngestionJob,
    file_name: String,
    grant: &IssuedGrant,
) -> Result<(), IngestError> {
    if !is_provider_file_name(&file_name) {
        return Err(IngestError::Validation(
            "The uploaded file reference is not valid.".to_string(),
        ));
    }

    job.raw_byte_length = Some(grant.size_bytes);
    job.mime_type = Some(grant.mime_type.clone());
    job.display_name = Some(grant.display_name.clone());
    job.attach_provider_file(ProviderFileHandle {
        name: file_name,
        uri: String::new(),
        mime_type: None,
    });

    // The browser already ran init and transfer+finalize
    advance_job(job, JobState::Initialized)?;
    advance_job(job, JobState::Transferred)?;
    advance_job(job, JobState::Finalized)?;
    Ok(())
}

/// Check the provider's ready file against what the grant declared, and
/// take the URI from the provider
fn confirm_direct_upload(
    job: &mut IngestionJob,
    status: &ProviderFileStatus,
    grant: &IssuedGrant,
) -> Result<(), IngestError> {
    let mismatch = |field: &str, reported: String| {
        warn!(
            field,
            reported = %reported,
            "Provider file does not match its upload grant"
        );
        IngestError::Validation("The uploaded file does not match its upload grant.".to_string())
    };

    match status.size_bytes {
        Some(size) if size == grant.size_bytes => {}
        other => return Err(mismatch("size_bytes", format!("{:?}", other))),
    }
    match status.mime_type.as_deref() {
        Some(mime) if mime.trim().eq_ignore_ascii_case(&grant.mime_type) => {}
        other => return Err(mismatch("mime_type", format!("{:?}", other))),
    }
    if let Some(name) = status.display_name.as_deref() {
        if name != grant.display_name {
            return Err(mismatch("display_name", name.to_string()));
        }
    }

    let uri = status.uri.clone().ok_or_else(|| {
        IngestError::ProviderProtocol("status response for a ready file has no uri".to_string())
    })?;
    if let Some(file) = job.provider_file.as_mut() {
        file.uri = uri;
        file.mime_type = status.mime_type.clone();
    }
    Ok(())
}

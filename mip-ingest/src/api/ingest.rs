//! Ingestion API handlers
//!
//! POST /ingest/upload, POST /ingest/url, POST /ingest/direct/grant,
//! POST /ingest/direct/complete
//!
//! Upload, URL and direct-complete answer with an SSE stream that carries
//! the job's progress and exactly one terminal outcome. Input problems
//! discovered after the request was accepted (oversize body, bad URL,
//! unknown grant) are reported on that stream, not as HTTP errors.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap},
    response::Response,
    routing::post,
    Json, Router,
};
use mip_common::human_size::format_bytes;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::api::sse::job_event_stream;
use crate::api::tenant::RequestTenant;
use crate::error::{ApiResult, IngestError};
use crate::models::media::SERVER_UPLOAD_MAX_BYTES;
use crate::models::{IngestionJob, SourceMode};
use crate::services::{
    is_provider_file_name, issue_direct_grant, ByteSource, DirectGrantRequest, DirectUploadGrant,
    ProgressEmitter,
};
use crate::AppState;

/// Optional header carrying the uploaded file's name
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// POST /ingest/url request
#[derive(Debug, Deserialize)]
pub struct UrlImportRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// POST /ingest/direct/complete request
///
/// URI, size and MIME type are never taken from the browser; the provider
/// reports them once the file is ready.
#[derive(Debug, Deserialize)]
pub struct DirectCompleteRequest {
    /// Id from the upload grant
    pub job_id: Uuid,
    /// Provider resource name returned by finalize (`files/...`)
    pub file_name: String,
}

/// POST /ingest/upload
///
/// Raw request body is the file; `Content-Type` is its MIME type.
pub async fn upload_file(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let job = IngestionJob::new(tenant, SourceMode::Upload);
    let source = read_upload(&headers, body).await;
    start_job(&state, job, source)
}

/// POST /ingest/url
pub async fn import_url(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Json(request): Json<UrlImportRequest>,
) -> Response {
    let job = IngestionJob::new(tenant, SourceMode::Url);
    let source = ByteSource::RemoteUrl {
        url: request.url,
        title: request.title,
    };
    start_job(&state, job, Ok(source))
}

/// POST /ingest/direct/grant
///
/// Opens the provider session and returns its upload URL. Oversize
/// requests get 400 before the provider is contacted.
pub async fn grant_direct_upload(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Json(request): Json<DirectGrantRequest>,
) -> ApiResult<Json<DirectUploadGrant>> {
    let grant = issue_direct_grant(state.pipeline.provider(), &tenant, &request).await?;
    state.grants.record(&tenant, &grant).await;
    Ok(Json(grant))
}

/// POST /ingest/direct/complete
///
/// The browser finished transfer+finalize; stream readiness and persistence.
///
/// A malformed file reference is refused without touching the grant, so the
/// browser can retry the completion.
pub async fn complete_direct_upload(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Json(request): Json<DirectCompleteRequest>,
) -> Response {
    let source = if is_provider_file_name(&request.file_name) {
        state
            .grants
            .redeem(request.job_id, &tenant)
            .await
            .map(|grant| ByteSource::BrowserDirect {
                file_name: request.file_name,
                grant,
            })
    } else {
        Err(IngestError::Validation(
            "The uploaded file reference is not valid.".to_string(),
        ))
    };

    let job = IngestionJob::with_id(request.job_id, tenant, SourceMode::Direct);
    start_job(&state, job, source)
}

/// Spawn the job and hand back its event stream
fn start_job(
    state: &AppState,
    job: IngestionJob,
    source: Result<ByteSource, IngestError>,
) -> Response {
    let job_id = job.job_id;
    let (emitter, rx) = ProgressEmitter::channel(job_id);
    let cancel = CancellationToken::new();
    let cancel_guard = cancel.clone().drop_guard();
    let pipeline = state.pipeline.clone();

    info!(job_id = %job_id, tenant = %job.tenant, mode = job.source_mode.as_str(), "Ingestion request accepted");

    tokio::spawn(async move {
        match source {
            Ok(source) => pipeline.run(job, source, emitter, cancel).await,
            Err(err) => pipeline.reject(job, err, emitter).await,
        };
    });

    job_event_stream(job_id, rx, cancel_guard)
}

/// Buffer the upload body, refusing oversize payloads
///
/// A declared `Content-Length` over the ceiling is refused without reading
/// the body.
async fn read_upload(headers: &HeaderMap, body: Body) -> Result<ByteSource, IngestError> {
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| IngestError::Validation("A Content-Type header is required.".to_string()))?;

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if let Some(declared) = declared {
        if declared > SERVER_UPLOAD_MAX_BYTES {
            return Err(IngestError::too_large("The file", declared, SERVER_UPLOAD_MAX_BYTES));
        }
    }

    let bytes = axum::body::to_bytes(body, SERVER_UPLOAD_MAX_BYTES as usize)
        .await
        .map_err(|_| {
            IngestError::Validation(format!(
                "The upload could not be read completely. Files sent through the server must not exceed {}.",
                format_bytes(SERVER_UPLOAD_MAX_BYTES)
            ))
        })?;

    let display_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    Ok(ByteSource::ServerBuffer {
        bytes,
        mime_type,
        display_name,
    })
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest/upload", post(upload_file))
        .route("/ingest/url", post(import_url))
        .route("/ingest/direct/grant", post(grant_direct_upload))
        .route("/ingest/direct/complete", post(complete_direct_upload))
}

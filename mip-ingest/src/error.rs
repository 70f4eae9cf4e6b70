//! Error types for mip-ingest
//!
//! [`IngestError`] is the job-level taxonomy. Every failure inside an
//! ingestion job ends up as one of these and is rendered once, through
//! [`IngestError::user_message`], as the terminal `{error}` event.
//! [`ApiError`] covers the plain JSON endpoints that do not stream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mip_common::human_size::format_bytes;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Provider call that failed with a transport error or non-2xx status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Opening the resumable session
    Init,
    /// Sending bytes with the upload-and-finalize command
    Upload,
    /// Readiness status request
    Status,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Init => "upload init",
            TransferStage::Upload => "upload transfer",
            TransferStage::Status => "status check",
        };
        f.write_str(name)
    }
}

/// Ingestion job error taxonomy
#[derive(Debug, Error)]
pub enum IngestError {
    /// Bad, missing, oversize or disallowed input. No network call was made
    /// on its account and retrying the same input cannot succeed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Provider response lacked a field or header the protocol requires
    #[error("Provider protocol error: {0}")]
    ProviderProtocol(String),

    /// Transport failure or non-2xx status from the provider
    #[error("Provider {stage} failed{}: {detail}", status_suffix(.status))]
    Transfer {
        stage: TransferStage,
        status: Option<u16>,
        detail: String,
    },

    /// Remote URL could not be fetched
    #[error("Fetching {url} failed: {detail}")]
    SourceFetch { url: String, detail: String },

    /// Provider reported a terminal FAILED state
    #[error("Provider processing failed: {0}")]
    ProcessingFailed(String),

    /// Attempt budget exhausted while the provider was still processing
    #[error("Provider still processing after {attempts} status checks ({waited:?})")]
    ProcessingTimeout { attempts: u32, waited: Duration },

    /// Durable store write failed after the provider accepted the file
    #[error("Persisting file record failed: {0}")]
    Persistence(String),

    /// Consumer went away and the job was stopped
    #[error("Job cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Oversize input, phrased with both the detected size and the ceiling
    pub fn too_large(what: &str, size_bytes: u64, limit_bytes: u64) -> Self {
        IngestError::Validation(format!(
            "{} is too large ({}). The maximum allowed size is {}.",
            what,
            format_bytes(size_bytes),
            format_bytes(limit_bytes)
        ))
    }

    /// Short machine-readable class, used as a tracing field
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation",
            IngestError::ProviderProtocol(_) => "provider_protocol",
            IngestError::Transfer { .. } => "transfer",
            IngestError::SourceFetch { .. } => "source_fetch",
            IngestError::ProcessingFailed(_) => "processing_failed",
            IngestError::ProcessingTimeout { .. } => "processing_timeout",
            IngestError::Persistence(_) => "persistence",
            IngestError::Cancelled => "cancelled",
            IngestError::Internal(_) => "internal",
        }
    }

    /// Whether resubmitting the same job could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            IngestError::Validation(_) | IngestError::ProcessingFailed(_)
        )
    }

    /// Humanized cause for the terminal `{error}` event
    pub fn user_message(&self) -> String {
        match self {
            IngestError::Validation(msg) => msg.clone(),
            IngestError::ProviderProtocol(_) => {
                "The processing service returned an unexpected response. Please try again later."
                    .to_string()
            }
            IngestError::Transfer { stage, .. } => match stage {
                TransferStage::Init => {
                    "Could not start the upload to the processing service. Please try again."
                        .to_string()
                }
                TransferStage::Upload => {
                    "The upload to the processing service failed. Please try again.".to_string()
                }
                TransferStage::Status => {
                    "Lost contact with the processing service while it was processing the file. Please try again."
                        .to_string()
                }
            },
            IngestError::SourceFetch { detail, .. } => {
                format!("Could not download the file: {}", detail)
            }
            IngestError::ProcessingFailed(_) => {
                "The processing service could not process this file. It may be corrupted or in an unsupported format."
                    .to_string()
            }
            IngestError::ProcessingTimeout { waited, .. } => format!(
                "Processing is taking longer than expected (over {} seconds). The file may still become available; please check back in a few minutes.",
                waited.as_secs()
            ),
            IngestError::Persistence(_) => {
                "The file was processed but could not be saved. Please try again.".to_string()
            }
            IngestError::Cancelled => "The upload was cancelled.".to_string(),
            IngestError::Internal(_) => {
                "An unexpected error occurred while processing the file.".to_string()
            }
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" with HTTP {}", code))
        .unwrap_or_default()
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upstream provider failure (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(msg) => ApiError::BadRequest(msg),
            IngestError::Internal(msg) | IngestError::Persistence(msg) => ApiError::Internal(msg),
            other => ApiError::Upstream(other.user_message()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

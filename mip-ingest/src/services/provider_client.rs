//! Provider client: resumable upload handshake and status checks
//!
//! Protocol, per file:
//! 1. *init* - `POST {base}/upload/v1beta/files` declaring protocol=resumable,
//!    command=start, total length, content type and display name. The
//!    session upload URL comes back in the `x-goog-upload-url` header.
//! 2. *transfer+finalize* - one `POST {upload_url}` with offset 0 and
//!    command `upload, finalize`, body = the whole payload. The response
//!    carries the file resource (name + URI).
//! 3. *status* - `GET {base}/v1beta/{name}`, inspecting `state` along with
//!    the resource's `uri`, `sizeBytes`, `mimeType` and `displayName`.
//!
//! No call is retried here. There is no chunked resumption either: a failed
//! transfer means the whole job starts over from init.

use crate::config::ProviderSettings;
use crate::error::{IngestError, TransferStage};
use crate::models::{ProviderFileHandle, ProviderFileState, ProviderFileStatus};
use async_trait::async_trait;
use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const USER_AGENT: &str = concat!("mip-ingest/", env!("CARGO_PKG_VERSION"));

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_PROTOCOL_HEADER: &str = "x-goog-upload-protocol";
const UPLOAD_COMMAND_HEADER: &str = "x-goog-upload-command";
const UPLOAD_OFFSET_HEADER: &str = "x-goog-upload-offset";
const UPLOAD_LENGTH_HEADER: &str = "x-goog-upload-header-content-length";
const UPLOAD_TYPE_HEADER: &str = "x-goog-upload-header-content-type";
/// Response header carrying the session-scoped upload URL
pub const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Longest provider error body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 300;

/// What the provider needs to open an upload session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub display_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// An open resumable session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Session-scoped URL accepting the payload; usable without the API key
    pub upload_url: String,
}

/// External processing backend
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Open a resumable upload session (init)
    async fn start_upload(&self, request: &UploadRequest) -> Result<UploadSession, IngestError>;

    /// Send the full payload from offset 0 and finalize (transfer+finalize)
    async fn upload_and_finalize(
        &self,
        session: &UploadSession,
        payload: Bytes,
    ) -> Result<ProviderFileHandle, IngestError>;

    /// Current readiness state of a finalized file, with the provider's
    /// view of the resource
    async fn file_status(&self, file: &ProviderFileHandle) -> Result<ProviderFileStatus, IngestError>;
}

/// File resource as returned by the provider
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: Option<String>,
    uri: Option<String>,
    mime_type: Option<String>,
    state: Option<String>,
    /// int64 fields arrive as JSON strings
    size_bytes: Option<serde_json::Value>,
    display_name: Option<String>,
}

/// Read `sizeBytes` whether it is encoded as a string or a number
fn parse_size(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::String(raw) => raw.trim().parse().ok(),
        other => other.as_u64(),
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: Option<FileResource>,
}

/// HTTP implementation of [`FileProvider`]
pub struct ProviderClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    transfer_timeout: Duration,
}

impl ProviderClient {
    pub fn new(settings: &ProviderSettings, api_key: String) -> Result<Self, IngestError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| IngestError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            transfer_timeout: Duration::from_secs(settings.transfer_timeout_secs),
        })
    }

    fn network_error(stage: TransferStage, err: reqwest::Error) -> IngestError {
        IngestError::Transfer {
            stage,
            status: None,
            detail: err.to_string(),
        }
    }

    /// Turn a non-2xx response into a [`IngestError::Transfer`]
    async fn ensure_success(
        stage: TransferStage,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, IngestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        Err(IngestError::Transfer {
            stage,
            status: Some(status.as_u16()),
            detail: if detail.is_empty() {
                status.to_string()
            } else {
                detail
            },
        })
    }
}

#[async_trait]
impl FileProvider for ProviderClient {
    async fn start_upload(&self, request: &UploadRequest) -> Result<UploadSession, IngestError> {
        let url = format!("{}/upload/v1beta/files", self.base_url);

        tracing::debug!(
            display_name = %request.display_name,
            mime_type = %request.mime_type,
            size_bytes = request.size_bytes,
            "Opening resumable upload session"
        );

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(UPLOAD_PROTOCOL_HEADER, "resumable")
            .header(UPLOAD_COMMAND_HEADER, "start")
            .header(UPLOAD_LENGTH_HEADER, request.size_bytes.to_string())
            .header(UPLOAD_TYPE_HEADER, &request.mime_type)
            .json(&json!({ "file": { "display_name": request.display_name } }))
            .send()
            .await
            .map_err(|e| Self::network_error(TransferStage::Init, e))?;

        let response = Self::ensure_success(TransferStage::Init, response).await?;

        let upload_url = response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                IngestError::ProviderProtocol(format!(
                    "upload init response is missing the {} header",
                    UPLOAD_URL_HEADER
                ))
            })?
            .to_string();

        Ok(UploadSession { upload_url })
    }

    async fn upload_and_finalize(
        &self,
        session: &UploadSession,
        payload: Bytes,
    ) -> Result<ProviderFileHandle, IngestError> {
        let size = payload.len();
        tracing::debug!(size_bytes = size, "Transferring payload with upload+finalize");

        let response = self
            .http_client
            .post(&session.upload_url)
            .timeout(self.transfer_timeout)
            .header(reqwest::header::CONTENT_LENGTH, size.to_string())
            .header(UPLOAD_OFFSET_HEADER, "0")
            .header(UPLOAD_COMMAND_HEADER, "upload, finalize")
            .body(payload)
            .send()
            .await
            .map_err(|e| Self::network_error(TransferStage::Upload, e))?;

        let response = Self::ensure_success(TransferStage::Upload, response).await?;

        let body: UploadResponse = response.json().await.map_err(|e| {
            IngestError::ProviderProtocol(format!("upload response is not valid JSON: {}", e))
        })?;

        let file = body.file.ok_or_else(|| {
            IngestError::ProviderProtocol("upload response has no file resource".to_string())
        })?;

        match (file.name, file.uri) {
            (Some(name), Some(uri)) if !name.is_empty() && !uri.is_empty() => {
                Ok(ProviderFileHandle {
                    name,
                    uri,
                    mime_type: file.mime_type,
                })
            }
            _ => Err(IngestError::ProviderProtocol(
                "upload response file resource lacks name or uri".to_string(),
            )),
        }
    }

    async fn file_status(&self, file: &ProviderFileHandle) -> Result<ProviderFileStatus, IngestError> {
        let url = format!("{}/v1beta/{}", self.base_url, file.name);

        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| Self::network_error(TransferStage::Status, e))?;

        let response = Self::ensure_success(TransferStage::Status, response).await?;

        let resource: FileResource = response.json().await.map_err(|e| {
            IngestError::ProviderProtocol(format!("status response is not valid JSON: {}", e))
        })?;

        let state = resource.state.as_deref().ok_or_else(|| {
            IngestError::ProviderProtocol("status response has no state field".to_string())
        })?;

        Ok(ProviderFileStatus {
            state: ProviderFileState::parse(state),
            uri: resource.uri.filter(|uri| !uri.is_empty()),
            mime_type: resource.mime_type,
            size_bytes: resource.size_bytes.as_ref().and_then(parse_size),
            display_name: resource.display_name,
        })
    }
}

//! Server-side download for URL imports
//!
//! The declared `Content-Length` is checked before any body byte is read;
//! the running total is checked again while streaming, since servers can
//! omit or understate the header. Redirects are followed only while every
//! hop passes the same [`UrlPolicy`] admission as the original URL.

use crate::error::IngestError;
use crate::models::media::{extension_of, mime_for_extension};
use crate::services::cancellable;
use crate::services::progress_emitter::ProgressEmitter;
use crate::services::url_policy::UrlPolicy;
use axum::body::Bytes;
use mip_common::events::{download_percent, ProgressPhase};
use mip_common::human_size::{format_bytes, MB};
use reqwest::Url;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Emit a download progress record every time this many bytes arrive
const PROGRESS_STEP_BYTES: u64 = 4 * MB;

/// Longest redirect chain followed
const MAX_REDIRECTS: usize = 5;

/// Generic MIME types that say nothing about the payload
const OPAQUE_MIME_TYPES: [&str; 2] = ["application/octet-stream", "binary/octet-stream"];

/// Downloaded payload plus what was learned about it
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Bytes,
    pub mime_type: String,
    pub display_name: String,
}

/// HTTP downloader with a hard size ceiling
pub struct RemoteFetcher {
    http_client: reqwest::Client,
    max_bytes: u64,
}

impl RemoteFetcher {
    pub fn new(
        fetch_timeout: Duration,
        max_bytes: u64,
        url_policy: UrlPolicy,
    ) -> Result<Self, IngestError> {
        let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match url_policy.check(attempt.url().as_str()) {
                Ok(_) => attempt.follow(),
                Err(_) => {
                    warn!(target_url = %attempt.url(), "Refusing redirect to a non-media location");
                    attempt.error("redirect target is not an importable media URL")
                }
            }
        });

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("mip-ingest/", env!("CARGO_PKG_VERSION")))
            .timeout(fetch_timeout)
            .redirect(redirect_policy)
            .build()
            .map_err(|e| IngestError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            max_bytes,
        })
    }

    /// Download `url` into memory
    pub async fn fetch(
        &self,
        url: &Url,
        title: Option<&str>,
        emitter: &mut ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia, IngestError> {
        let fetch_error = |detail: String| IngestError::SourceFetch {
            url: url.to_string(),
            detail,
        };

        let mut response = cancellable(cancel, async {
            self.http_client.get(url.clone()).send().await.map_err(|e| {
                if e.is_redirect() {
                    IngestError::Validation(
                        "The URL redirects to a location that is not a direct media file."
                            .to_string(),
                    )
                } else {
                    fetch_error(e.to_string())
                }
            })
        })
        .await?;
        let final_path = response.url().path().to_string();

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!(
                "the server responded with HTTP {}",
                status.as_u16()
            )));
        }

        let declared = response.content_length();
        if let Some(declared) = declared {
            if declared > self.max_bytes {
                return Err(IngestError::too_large("The remote file", declared, self.max_bytes));
            }
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty());

        let mut buffer: Vec<u8> = Vec::with_capacity(declared.unwrap_or(0) as usize);
        let mut next_report = PROGRESS_STEP_BYTES;

        loop {
            let chunk = cancellable(cancel, async {
                response.chunk().await.map_err(|e| fetch_error(e.to_string()))
            })
            .await?;

            let Some(chunk) = chunk else { break };

            let received = (buffer.len() + chunk.len()) as u64;
            if received > self.max_bytes {
                return Err(IngestError::Validation(format!(
                    "The remote file exceeds the maximum allowed size of {}.",
                    format_bytes(self.max_bytes)
                )));
            }
            buffer.extend_from_slice(&chunk);

            if received >= next_report {
                next_report = received + PROGRESS_STEP_BYTES;
                let message = match declared {
                    Some(total) => format!(
                        "Downloading... {} of {}",
                        format_bytes(received),
                        format_bytes(total)
                    ),
                    None => format!("Downloading... {}", format_bytes(received)),
                };
                emitter
                    .progress(
                        ProgressPhase::Downloading,
                        message,
                        download_percent(received, declared),
                    )
                    .await;
            }
        }

        if buffer.is_empty() {
            return Err(IngestError::Validation(
                "The downloaded file is empty.".to_string(),
            ));
        }

        let mime_type = resolve_mime(header_mime.as_deref(), &final_path);
        let display_name = resolve_display_name(title, url);

        info!(
            url = %url,
            size_bytes = buffer.len(),
            mime_type = %mime_type,
            "Remote file downloaded"
        );
        debug!(declared = ?declared, "Declared vs received length");

        Ok(FetchedMedia {
            bytes: Bytes::from(buffer),
            mime_type,
            display_name,
        })
    }
}

/// Prefer a specific Content-Type, then the path extension
fn resolve_mime(header_mime: Option<&str>, path: &str) -> String {
    if let Some(mime) = header_mime.filter(|m| !OPAQUE_MIME_TYPES.contains(m)) {
        return mime.to_string();
    }
    extension_of(path)
        .and_then(|ext| mime_for_extension(&ext))
        .or(header_mime)
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Caller-supplied title, else the last path segment, else the host
fn resolve_display_name(title: Option<&str>, url: &Url) -> String {
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(String::from)
        .or_else(|| url.host_str().map(String::from))
        .unwrap_or_else(|| "remote-file".to_string())
}

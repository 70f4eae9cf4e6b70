//! Upload grants for browser-direct transfers
//!
//! The browser never sees the provider API key. Instead this server opens
//! the resumable session itself and hands out the session upload URL, which
//! only accepts bytes for that one file and expires with the session. After
//! the browser finalizes, it reports the provider file name through the
//! direct-complete call and the job continues with readiness polling. The
//! grant remembers what was declared; the provider's own description of the
//! file is checked against it before anything is recorded.

use crate::error::IngestError;
use crate::models::{MediaKind, TenantId};
use crate::services::provider_client::{FileProvider, UploadRequest};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifetime advertised for a grant
pub const GRANT_TTL_MINUTES: i64 = 60;

/// Browser's description of the file it wants to send
#[derive(Debug, Clone, Deserialize)]
pub struct DirectGrantRequest {
    pub display_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Short-lived, single-file upload credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectUploadGrant {
    /// Id to quote in the completion call
    pub job_id: Uuid,
    /// Session-scoped provider URL the browser sends bytes to
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
    pub max_bytes: u64,
    pub media_kind: MediaKind,
    /// Declared file, echoed back as the session was opened with it
    pub display_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Validate a direct-upload request and open its provider session
pub async fn issue_direct_grant(
    provider: &dyn FileProvider,
    tenant: &TenantId,
    request: &DirectGrantRequest,
) -> Result<DirectUploadGrant, IngestError> {
    let mime_type = request.mime_type.trim();
    if mime_type.is_empty() {
        return Err(IngestError::Validation("A MIME type is required.".to_string()));
    }
    if request.size_bytes == 0 {
        return Err(IngestError::Validation("The file is empty.".to_string()));
    }

    let media_kind = MediaKind::from_mime(mime_type);
    let max_bytes = media_kind.direct_upload_limit();
    if request.size_bytes > max_bytes {
        return Err(IngestError::too_large("The file", request.size_bytes, max_bytes));
    }

    let display_name = match request.display_name.trim() {
        "" => "upload".to_string(),
        name => name.to_string(),
    };

    let session = provider
        .start_upload(&UploadRequest {
            display_name: display_name.clone(),
            mime_type: mime_type.to_string(),
            size_bytes: request.size_bytes,
        })
        .await?;

    let job_id = Uuid::new_v4();
    info!(
        job_id = %job_id,
        tenant = %tenant,
        size_bytes = request.size_bytes,
        media_kind = media_kind.noun(),
        "Issued direct upload grant"
    );

    Ok(DirectUploadGrant {
        job_id,
        upload_url: session.upload_url,
        expires_at: Utc::now() + Duration::minutes(GRANT_TTL_MINUTES),
        max_bytes,
        media_kind,
        display_name,
        mime_type: mime_type.to_string(),
        size_bytes: request.size_bytes,
    })
}

/// `files/<id>` with a lowercase alphanumeric/dash id
pub fn is_provider_file_name(name: &str) -> bool {
    name.strip_prefix("files/")
        .map(|id| {
            !id.is_empty()
                && id.len() <= 64
                && id
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        })
        .unwrap_or(false)
}

/// What the server remembers about a grant until it is redeemed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedGrant {
    pub tenant: TenantId,
    pub expires_at: DateTime<Utc>,
    pub display_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Outstanding direct-upload grants, redeemable once by the issuing tenant
#[derive(Debug, Clone, Default)]
pub struct GrantRegistry {
    grants: Arc<RwLock<HashMap<Uuid, IssuedGrant>>>,
}

impl GrantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `grant` for `tenant`, dropping any grants that have expired
    pub async fn record(&self, tenant: &TenantId, grant: &DirectUploadGrant) {
        let now = Utc::now();
        let mut grants = self.grants.write().await;
        let before = grants.len();
        grants.retain(|_, issued| issued.expires_at > now);
        if grants.len() < before {
            debug!(expired = before - grants.len(), "Pruned expired upload grants");
        }
        grants.insert(
            grant.job_id,
            IssuedGrant {
                tenant: tenant.clone(),
                expires_at: grant.expires_at,
                display_name: grant.display_name.clone(),
                mime_type: grant.mime_type.clone(),
                size_bytes: grant.size_bytes,
            },
        );
    }

    /// Consume the grant for `job_id` and return what it declared
    ///
    /// Fails if the id was never issued, was issued to another tenant or has
    /// expired. A grant belonging to another tenant is left in place.
    pub async fn redeem(&self, job_id: Uuid, tenant: &TenantId) -> Result<IssuedGrant, IngestError> {
        let unknown = || {
            IngestError::Validation("This upload grant is unknown or has expired.".to_string())
        };

        let mut grants = self.grants.write().await;
        match grants.get(&job_id) {
            Some(issued) if &issued.tenant == tenant => {}
            _ => return Err(unknown()),
        }
        let issued = grants.remove(&job_id).ok_or_else(unknown)?;

        if issued.expires_at <= Utc::now() {
            return Err(unknown());
        }
        Ok(issued)
    }

    pub async fn outstanding(&self) -> usize {
        self.grants.read().await.len()
    }
}

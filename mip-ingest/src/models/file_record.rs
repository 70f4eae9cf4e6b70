//! Durable record of a file that reached the ready state

use crate::models::{IngestionJob, SourceMode, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted file metadata, keyed by the job id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedFileRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub source_mode: SourceMode,
    pub provider_file_id: String,
    pub provider_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ready_at: DateTime<Utc>,
}

impl PersistedFileRecord {
    /// Build the record for a job the provider reported ready
    ///
    /// Returns `None` unless the job carries a provider handle, a MIME type
    /// and a byte length.
    pub fn from_ready_job(job: &IngestionJob, ready_at: DateTime<Utc>) -> Option<Self> {
        let handle = job.provider_file.as_ref()?;
        Some(Self {
            id: job.job_id,
            tenant_id: job.tenant.clone(),
            display_name: job.display_name_or_default(),
            mime_type: job
                .mime_type
                .clone()
                .or_else(|| handle.mime_type.clone())?,
            size_bytes: job.raw_byte_length?,
            source_mode: job.source_mode,
            provider_file_id: handle.name.clone(),
            provider_uri: handle.uri.clone(),
            sha256: job.sha256.clone(),
            started_at: job.started_at,
            ready_at,
        })
    }
}

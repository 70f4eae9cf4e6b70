//! Ingestion job state machine
//!
//! One job per request/stream, owned by the task driving it:
//! UNSTARTED → INITIALIZED → TRANSFERRED → FINALIZED → (POLLING →)* READY | FAILED | TIMEOUT
//!
//! Transitions only move forward. FAILED and CANCELLED may be entered from
//! any non-terminal state; READY and TIMEOUT only once the provider has
//! finalized the file.

use crate::error::IngestError;
use crate::models::{ProviderFileHandle, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the bytes reach the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Byte buffer posted through this server
    Upload,
    /// Remote URL fetched server-side
    Url,
    /// Browser uploads straight to the provider
    Direct,
}

impl SourceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceMode::Upload => "upload",
            SourceMode::Url => "url",
            SourceMode::Direct => "direct",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "upload" => Some(SourceMode::Upload),
            "url" => Some(SourceMode::Url),
            "direct" => Some(SourceMode::Direct),
            _ => None,
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Unstarted,
    /// Resumable session opened, upload URL known
    Initialized,
    /// Payload accepted by the provider
    Transferred,
    /// Provider assigned file id + URI
    Finalized,
    /// Waiting on provider readiness
    Polling,
    /// Provider reported the file ready
    Ready,
    /// Job failed (any cause other than timeout)
    Failed,
    /// Poll budget exhausted while still processing
    Timeout,
    /// Consumer disconnected before completion
    Cancelled,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            JobState::Unstarted => 0,
            JobState::Initialized => 1,
            JobState::Transferred => 2,
            JobState::Finalized => 3,
            JobState::Polling => 4,
            JobState::Ready | JobState::Failed | JobState::Timeout | JobState::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 5
    }
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_state: JobState,
    pub new_state: JobState,
    pub transitioned_at: DateTime<Utc>,
}

/// Ephemeral per-request ingestion job
#[derive(Debug, Clone)]
pub struct IngestionJob {
    /// Job-local id; also the persisted record's key
    pub job_id: Uuid,
    pub tenant: TenantId,
    pub source_mode: SourceMode,
    /// Payload size once known
    pub raw_byte_length: Option<u64>,
    pub mime_type: Option<String>,
    pub display_name: Option<String>,
    /// Set once the provider has finalized the upload
    pub provider_file: Option<ProviderFileHandle>,
    /// SHA-256 of the payload when the bytes passed through this server
    pub sha256: Option<String>,
    pub state: JobState,
    /// Status checks performed so far
    pub attempt_count: u32,
    pub started_at: DateTime<Utc>,
}

impl IngestionJob {
    /// Create new job with a fresh id
    pub fn new(tenant: TenantId, source_mode: SourceMode) -> Self {
        Self::with_id(Uuid::new_v4(), tenant, source_mode)
    }

    /// Create a job under an id issued earlier (direct uploads reuse the
    /// id handed out with the upload grant)
    pub fn with_id(job_id: Uuid, tenant: TenantId, source_mode: SourceMode) -> Self {
        Self {
            job_id,
            tenant,
            source_mode,
            raw_byte_length: None,
            mime_type: None,
            display_name: None,
            provider_file: None,
            sha256: None,
            state: JobState::Unstarted,
            attempt_count: 0,
            started_at: Utc::now(),
        }
    }

    /// Move to `new_state`, rejecting anything that is not forward progress
    pub fn advance(&mut self, new_state: JobState) -> Result<StateTransition, IngestError> {
        let old_state = self.state;

        let allowed = if old_state.is_terminal() {
            false
        } else {
            match new_state {
                JobState::Polling => matches!(old_state, JobState::Finalized | JobState::Polling),
                JobState::Ready | JobState::Timeout => {
                    matches!(old_state, JobState::Finalized | JobState::Polling)
                }
                JobState::Failed | JobState::Cancelled => true,
                other => other.rank() > old_state.rank(),
            }
        };

        if !allowed {
            return Err(IngestError::Internal(format!(
                "Illegal job state transition {:?} -> {:?}",
                old_state, new_state
            )));
        }

        self.state = new_state;
        Ok(StateTransition {
            job_id: self.job_id,
            old_state,
            new_state,
            transitioned_at: Utc::now(),
        })
    }

    /// Record the provider handle after finalize
    pub fn attach_provider_file(&mut self, handle: ProviderFileHandle) {
        self.provider_file = Some(handle);
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Name for logs and records, falling back to the job id
    pub fn display_name_or_default(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("upload-{}", self.job_id))
    }
}

//! Data models for mip-ingest
//!
//! - Ingestion job state machine
//! - Provider file handle and readiness state
//! - Persisted file record
//! - Media kinds and size ceilings

pub mod file_record;
pub mod ingestion_job;
pub mod media;
pub mod provider_file;
pub mod tenant;

pub use file_record::PersistedFileRecord;
pub use ingestion_job::{IngestionJob, JobState, SourceMode, StateTransition};
pub use media::MediaKind;
pub use provider_file::{ProviderFileHandle, ProviderFileState, ProviderFileStatus};
pub use tenant::TenantId;

//! Durable store seam for ready files

use crate::models::PersistedFileRecord;
use async_trait::async_trait;

/// Writes the record of a file the provider reported ready
#[async_trait]
pub trait MetadataPersister: Send + Sync {
    /// Idempotent by record id: writing the same record twice keeps one row.
    /// Returns `true` when a new row was written.
    async fn persist(&self, record: &PersistedFileRecord) -> anyhow::Result<bool>;
}

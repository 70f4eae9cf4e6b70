//! File record storage

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{PersistedFileRecord, SourceMode, TenantId};
use crate::services::MetadataPersister;

const SELECT_COLUMNS: &str = "id, tenant_id, display_name, mime_type, size_bytes, source_mode, \
     provider_file_id, provider_uri, sha256, started_at, ready_at";

/// SQLite-backed store for [`PersistedFileRecord`]s
#[derive(Clone)]
pub struct FileStore {
    pool: SqlitePool,
}

impl FileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert unless a record with the same id exists; true when inserted
    pub async fn insert(&self, record: &PersistedFileRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO files (
                id, tenant_id, display_name, mime_type, size_bytes, source_mode,
                provider_file_id, provider_uri, sha256, started_at, ready_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.tenant_id.as_str())
        .bind(&record.display_name)
        .bind(&record.mime_type)
        .bind(record.size_bytes as i64)
        .bind(record.source_mode.as_str())
        .bind(&record.provider_file_id)
        .bind(&record.provider_uri)
        .bind(&record.sha256)
        .bind(record.started_at.to_rfc3339())
        .bind(record.ready_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert file record")?;

        Ok(result.rows_affected() == 1)
    }

    /// All records of a tenant, newest first
    pub async fn list_for_tenant(&self, tenant: &TenantId) -> Result<Vec<PersistedFileRecord>> {
        let sql = format!(
            "SELECT {} FROM files WHERE tenant_id = ? ORDER BY ready_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(tenant.as_str())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list file records")?;

        rows.iter().map(record_from_row).collect()
    }

    /// One record, only if it belongs to `tenant`
    pub async fn get_for_tenant(
        &self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<PersistedFileRecord>> {
        let sql = format!(
            "SELECT {} FROM files WHERE id = ? AND tenant_id = ?",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(tenant.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load file record")?;

        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl MetadataPersister for FileStore {
    async fn persist(&self, record: &PersistedFileRecord) -> Result<bool> {
        self.insert(record).await
    }
}

fn record_from_row(row: &SqliteRow) -> Result<PersistedFileRecord> {
    let id: String = row.try_get("id")?;
    let tenant: String = row.try_get("tenant_id")?;
    let size_bytes: i64 = row.try_get("size_bytes")?;
    let source_mode: String = row.try_get("source_mode")?;
    let started_at: String = row.try_get("started_at")?;
    let ready_at: String = row.try_get("ready_at")?;

    Ok(PersistedFileRecord {
        id: Uuid::parse_str(&id).with_context(|| format!("Invalid record id {}", id))?,
        tenant_id: TenantId::new(tenant.clone())
            .with_context(|| format!("Invalid tenant id {}", tenant))?,
        display_name: row.try_get("display_name")?,
        mime_type: row.try_get("mime_type")?,
        size_bytes: size_bytes.max(0) as u64,
        source_mode: SourceMode::parse(&source_mode)
            .with_context(|| format!("Invalid source mode {}", source_mode))?,
        provider_file_id: row.try_get("provider_file_id")?,
        provider_uri: row.try_get("provider_uri")?,
        sha256: row.try_get("sha256")?,
        started_at: parse_timestamp(&started_at)?,
        ready_at: parse_timestamp(&ready_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp {}", raw))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_tables;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> FileStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_tables(&pool).await.unwrap();
        FileStore::new(pool)
    }

    fn record(tenant: &str, name: &str) -> PersistedFileRecord {
        PersistedFileRecord {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new(tenant).unwrap(),
            display_name: name.to_string(),
            mime_type: "video/mp4".to_string(),
            size_bytes: 1024,
            source_mode: SourceMode::Url,
            provider_file_id: "files/abc".to_string(),
            provider_uri: "https://provider.test/files/abc".to_string(),
            sha256: Some("00ff".to_string()),
            started_at: Utc::now(),
            ready_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn persisting_twice_keeps_one_row() {
        let store = store().await;
        let record = record("t1", "clip.mp4");

        assert!(store.persist(&record).await.unwrap());
        assert!(!store.persist(&record).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        let loaded = store
            .get_for_tenant(&record.tenant_id, record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.display_name, "clip.mp4");
        assert_eq!(loaded.sha256.as_deref(), Some("00ff"));
        assert_eq!(loaded.source_mode, SourceMode::Url);
    }

    #[tokio::test]
    async fn records_are_scoped_to_their_tenant() {
        let store = store().await;
        let mine = record("t1", "mine.mp4");
        let theirs = record("t2", "theirs.mp4");
        store.insert(&mine).await.unwrap();
        store.insert(&theirs).await.unwrap();

        let listed = store.list_for_tenant(&mine.tenant_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);

        assert!(store
            .get_for_tenant(&mine.tenant_id, theirs.id)
            .await
            .unwrap()
            .is_none());
    }
}

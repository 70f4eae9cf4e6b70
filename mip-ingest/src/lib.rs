//! mip-ingest library interface
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult, IngestError};

use anyhow::Context;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::IngestConfig;
use crate::db::FileStore;
use crate::models::media::URL_IMPORT_MAX_BYTES;
use crate::models::TenantId;
use crate::services::{FileProvider, GrantRegistry, IngestionPipeline, RemoteFetcher, UrlPolicy};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub files: FileStore,
    pub pipeline: Arc<IngestionPipeline>,
    /// Outstanding browser-direct upload grants
    pub grants: GrantRegistry,
    /// Tenant for requests without an `x-tenant-id` header
    pub default_tenant: Option<TenantId>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        pipeline: Arc<IngestionPipeline>,
        default_tenant: Option<TenantId>,
    ) -> Self {
        Self {
            files: FileStore::new(db.clone()),
            db,
            pipeline,
            grants: GrantRegistry::new(),
            default_tenant,
            startup_time: Utc::now(),
        }
    }

    /// Wire the pipeline from configuration around the given provider
    pub fn from_config(
        db: SqlitePool,
        provider: Arc<dyn FileProvider>,
        config: &IngestConfig,
    ) -> anyhow::Result<Self> {
        let default_tenant = match &config.default_tenant {
            Some(raw) => Some(
                TenantId::new(raw.as_str())
                    .with_context(|| format!("Invalid default_tenant {:?}", raw))?,
            ),
            None => None,
        };

        let url_policy = UrlPolicy::new(&config.url_import.allowed_hosts);
        let fetcher = RemoteFetcher::new(
            Duration::from_secs(config.url_import.fetch_timeout_secs),
            URL_IMPORT_MAX_BYTES,
            url_policy.clone(),
        )?;
        let pipeline = IngestionPipeline::new(
            provider,
            Arc::new(FileStore::new(db.clone())),
            fetcher,
            url_policy,
            config.polling.policy(),
        );

        Ok(Self::new(db, Arc::new(pipeline), default_tenant))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ingest_routes())
        .merge(api::file_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

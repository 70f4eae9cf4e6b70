//! Test Helper Utilities
//!
//! Shared utilities for testing mip-ingest

#![allow(dead_code)]

pub mod provider_stub;

pub use provider_stub::{ProviderStub, StubBehavior, CLIP_BYTES};

use axum::{body::Body, http::Request, response::Response, Router};
use http_body_util::BodyExt;
use mip_common::events::ProgressEvent;
use mip_common::sse::EventStreamDecoder;
use mip_ingest::config::{IngestConfig, ProviderSettings};
use mip_ingest::services::ProviderClient;
use mip_ingest::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub const TENANT: &str = "tenant-a";

/// Config pointing at `stub`, with a fast poll cadence
pub fn test_config(stub: &ProviderStub, max_attempts: u32) -> IngestConfig {
    let mut config = IngestConfig::default();
    config.provider = ProviderSettings {
        base_url: stub.base_url.clone(),
        api_key: Some("test-key".to_string()),
        request_timeout_secs: 5,
        transfer_timeout_secs: 5,
    };
    config.polling.interval_ms = 5;
    config.polling.max_attempts = max_attempts;
    config.url_import.fetch_timeout_secs = 5;
    config
}

/// In-memory database with the schema applied
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    mip_ingest::db::init_tables(&pool)
        .await
        .expect("Failed to initialize database schema");
    pool
}

/// Router wired to the provider `config` points at
pub async fn create_test_app(config: IngestConfig) -> (Router, AppState) {
    let pool = create_test_db().await;
    let provider = ProviderClient::new(&config.provider, "test-key".to_string())
        .expect("Failed to build provider client");
    let state = AppState::from_config(pool, Arc::new(provider), &config)
        .expect("Failed to build app state");
    (mip_ingest::build_router(state.clone()), state)
}

/// JSON POST carrying the test tenant
pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-tenant-id", TENANT)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a whole SSE response and decode its records
pub async fn read_events(response: Response) -> Vec<ProgressEvent> {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let mut decoder = EventStreamDecoder::new();
    let mut events = decoder.push(&body).unwrap();
    if let Some(last) = decoder.finish().unwrap() {
        events.push(last);
    }
    events
}

/// Exactly one terminal outcome, and nothing after it
pub fn assert_single_terminal(events: &[ProgressEvent]) {
    let terminal: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, event)| event.is_terminal())
        .map(|(index, _)| index)
        .collect();
    assert_eq!(terminal, vec![events.len() - 1], "events: {:?}", events);

    let successes = events
        .iter()
        .filter(|event| matches!(event, ProgressEvent::Success { .. }))
        .count();
    match events.last() {
        Some(ProgressEvent::Done { .. }) => {
            assert_eq!(successes, 1);
            assert!(matches!(events[events.len() - 2], ProgressEvent::Success { .. }));
        }
        Some(ProgressEvent::Error { .. }) => assert_eq!(successes, 0),
        other => panic!("stream ended without outcome: {:?}", other),
    }
}

/// Message of the terminal error record
pub fn error_message(events: &[ProgressEvent]) -> String {
    match events.last() {
        Some(ProgressEvent::Error { error }) => error.clone(),
        other => panic!("expected error outcome, got {:?}", other),
    }
}

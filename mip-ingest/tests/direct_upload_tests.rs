//! Integration tests for browser-direct uploads (grant + complete)

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use helpers::*;
use http_body_util::BodyExt;
use mip_common::events::ProgressEvent;
use mip_ingest::models::{SourceMode, TenantId};
use serde_json::json;
use tower::util::ServiceExt;

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn request_grant(
    app: &axum::Router,
    display_name: &str,
    mime_type: &str,
    size_bytes: u64,
) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "/ingest/direct/grant",
            json!({
                "display_name": display_name,
                "mime_type": mime_type,
                "size_bytes": size_bytes
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

async fn complete(app: &axum::Router, job_id: &serde_json::Value, file_name: &str) -> Vec<ProgressEvent> {
    let response = app
        .clone()
        .oneshot(json_request(
            "/ingest/direct/complete",
            json!({ "job_id": job_id, "file_name": file_name }),
        ))
        .await
        .unwrap();
    read_events(response).await
}

fn tenant() -> TenantId {
    TenantId::new(TENANT).unwrap()
}

#[tokio::test]
async fn test_grant_over_ceiling_is_refused_without_provider_call() {
    let stub = ProviderStub::start(StubBehavior::ready_at(1)).await;
    let (app, _state) = create_test_app(test_config(&stub, 10)).await;

    let response = app
        .oneshot(json_request(
            "/ingest/direct/grant",
            json!({
                "display_name": "movie.mp4",
                "mime_type": "video/mp4",
                "size_bytes": 3u64 * 1024 * 1024 * 1024
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    let message = json["error"]["message"].as_str().unwrap();
    assert!(message.contains("3 GB"), "{}", message);
    assert!(message.contains("2 GB"), "{}", message);
    assert_eq!(stub.init_calls(), 0);
}

#[tokio::test]
async fn test_grant_then_complete_streams_success() {
    // Given: a grant for a 2 KiB video
    let stub = ProviderStub::start(StubBehavior::ready_at(2)).await;
    let (app, state) = create_test_app(test_config(&stub, 10)).await;

    let grant = request_grant(&app, "movie.mp4", "video/mp4", 2048).await;
    assert_eq!(grant["upload_url"], format!("{}/upload-session/1", stub.base_url));
    assert_eq!(grant["media_kind"], "video");
    assert_eq!(stub.init_calls(), 1);
    assert_eq!(
        stub.init_header("x-goog-upload-header-content-length").as_deref(),
        Some("2048")
    );

    // And: the browser sent the bytes straight to the provider
    let file = stub
        .browser_upload(grant["upload_url"].as_str().unwrap(), vec![9u8; 2048])
        .await;

    // When: the browser reports the finalized file
    let events = complete(&app, &grant["job_id"], file["name"].as_str().unwrap()).await;

    // Then: the server polls, persists and reports success
    assert_single_terminal(&events);
    assert!(matches!(events.last(), Some(ProgressEvent::Done { .. })));
    assert_eq!(stub.upload_calls(), 1);
    assert_eq!(stub.status_calls(), 2);

    // And: the record describes the file as the provider sees it
    let records = state.files.list_for_tenant(&tenant()).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id.to_string(), grant["job_id"].as_str().unwrap());
    assert_eq!(record.source_mode, SourceMode::Direct);
    assert_eq!(record.provider_file_id, "files/stub-1");
    assert_eq!(record.provider_uri, file["uri"].as_str().unwrap());
    assert_eq!(record.size_bytes, 2048);
    assert_eq!(record.mime_type, "video/mp4");
    assert_eq!(record.display_name, "movie.mp4");
    assert!(record.sha256.is_none());
}

#[tokio::test]
async fn test_complete_without_grant_fails_on_stream() {
    let stub = ProviderStub::start(StubBehavior::ready_at(1)).await;
    let (app, state) = create_test_app(test_config(&stub, 10)).await;

    let events = complete(&app, &json!(uuid::Uuid::new_v4()), "files/stub-1").await;

    assert_single_terminal(&events);
    assert!(error_message(&events).contains("unknown or has expired"));
    assert_eq!(stub.status_calls(), 0);
    assert_eq!(state.files.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_grant_is_single_use() {
    let stub = ProviderStub::start(StubBehavior::ready_at(1)).await;
    let (app, state) = create_test_app(test_config(&stub, 10)).await;

    let grant = request_grant(&app, "a.png", "image/png", 2048).await;
    let file = stub
        .browser_upload(grant["upload_url"].as_str().unwrap(), vec![1u8; 2048])
        .await;
    let file_name = file["name"].as_str().unwrap();

    let first = complete(&app, &grant["job_id"], file_name).await;
    assert!(matches!(first.last(), Some(ProgressEvent::Done { .. })));

    let second = complete(&app, &grant["job_id"], file_name).await;
    assert_single_terminal(&second);
    assert!(matches!(second.last(), Some(ProgressEvent::Error { .. })));
    assert_eq!(state.files.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_complete_with_bogus_file_name_is_rejected() {
    let stub = ProviderStub::start(StubBehavior::ready_at(1)).await;
    let (app, _state) = create_test_app(test_config(&stub, 10)).await;

    let grant = request_grant(&app, "doc.pdf", "application/pdf", 4096).await;
    let events = complete(&app, &grant["job_id"], "../../v1beta/models").await;

    assert_single_terminal(&events);
    assert!(error_message(&events).contains("not valid"));
    assert_eq!(stub.status_calls(), 0);
}

#[tokio::test]
async fn test_malformed_completion_keeps_the_grant() {
    // Given: a finalized direct upload
    let stub = ProviderStub::start(StubBehavior::ready_at(1)).await;
    let (app, state) = create_test_app(test_config(&stub, 10)).await;
    let grant = request_grant(&app, "clip.mp4", "video/mp4", 512).await;
    stub.browser_upload(grant["upload_url"].as_str().unwrap(), vec![3u8; 512])
        .await;

    // When: the first completion carries a mistyped file reference
    let rejected = complete(&app, &grant["job_id"], "files/Stub-1").await;
    assert_single_terminal(&rejected);
    assert!(error_message(&rejected).contains("not valid"));
    assert_eq!(state.grants.outstanding().await, 1);

    // Then: a corrected completion still goes through
    let accepted = complete(&app, &grant["job_id"], "files/stub-1").await;
    assert_single_terminal(&accepted);
    assert!(matches!(accepted.last(), Some(ProgressEvent::Done { .. })));
    assert_eq!(state.files.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_completion_cannot_claim_another_tenants_file() {
    // Given: tenant-b's file, uploaded through the server
    let stub = ProviderStub::start(StubBehavior::ready_at(1)).await;
    let (app, state) = create_test_app(test_config(&stub, 10)).await;
    let upload = Request::builder()
        .method("POST")
        .uri("/ingest/upload")
        .header("content-type", "video/mp4")
        .header("x-tenant-id", "tenant-b")
        .body(Body::from(CLIP_BYTES))
        .unwrap();
    let events = read_events(app.clone().oneshot(upload).await.unwrap()).await;
    assert!(matches!(events.last(), Some(ProgressEvent::Done { .. })));

    // When: tenant-a redeems its own grant with tenant-b's file name
    let grant = request_grant(&app, "clip.mp4", "video/mp4", 1024).await;
    let events = complete(&app, &grant["job_id"], "files/stub-1").await;

    // Then: the provider's description does not match the grant
    assert_single_terminal(&events);
    assert!(error_message(&events).contains("does not match"));
    assert!(state.files.list_for_tenant(&tenant()).await.unwrap().is_empty());
    assert_eq!(state.files.count().await.unwrap(), 1);
    assert_eq!(stub.upload_calls(), 1);
}

#[tokio::test]
async fn test_completion_naming_a_missing_file_fails() {
    let stub = ProviderStub::start(StubBehavior::ready_at(1)).await;
    let (app, state) = create_test_app(test_config(&stub, 10)).await;
    let grant = request_grant(&app, "clip.mp4", "video/mp4", 1024).await;

    let events = complete(&app, &grant["job_id"], "files/someone-elses-file").await;

    assert_single_terminal(&events);
    assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    assert_eq!(stub.upload_calls(), 0);
    assert_eq!(state.files.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_transfer_shorter_than_granted_is_rejected() {
    let stub = ProviderStub::start(StubBehavior::ready_at(1)).await;
    let (app, state) = create_test_app(test_config(&stub, 10)).await;
    let grant = request_grant(&app, "clip.mp4", "video/mp4", 4096).await;
    let file = stub
        .browser_upload(grant["upload_url"].as_str().unwrap(), vec![5u8; 100])
        .await;

    let events = complete(&app, &grant["job_id"], file["name"].as_str().unwrap()).await;

    assert_single_terminal(&events);
    assert!(error_message(&events).contains("does not match"));
    assert_eq!(state.files.count().await.unwrap(), 0);
}

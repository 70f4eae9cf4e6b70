//! In-process provider stub
//!
//! Speaks the resumable upload protocol on 127.0.0.1 with scriptable
//! misbehavior, and doubles as the remote host for URL-import tests
//! (`/media/...`).

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Body served by `/media/clip.mp4`
pub const CLIP_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42-not-really-a-video";

/// Scripted provider behavior
#[derive(Debug, Clone, Default)]
pub struct StubBehavior {
    /// Leave out the upload URL header on init
    pub omit_upload_url: bool,
    /// Answer init with this status instead of 200
    pub init_status: Option<u16>,
    /// Answer the transfer with this status instead of 200
    pub upload_status: Option<u16>,
    /// Report FAILED on this status check (1-based)
    pub fail_at_check: Option<u32>,
    /// Report ACTIVE from this status check on; `None` means never
    pub ready_at_check: Option<u32>,
}

impl StubBehavior {
    pub fn ready_at(check: u32) -> Self {
        Self {
            ready_at_check: Some(check),
            ..Self::default()
        }
    }
}

/// Session opened by init
#[derive(Debug, Clone, Default)]
struct StubSession {
    display_name: String,
    mime_type: String,
}

/// File created by a finalized transfer
#[derive(Debug, Clone)]
struct StubFile {
    display_name: String,
    mime_type: String,
    size_bytes: usize,
}

/// What one transfer request looked like
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub command: Option<String>,
    pub offset: Option<String>,
    pub body_len: usize,
}

#[derive(Default)]
struct StubState {
    base_url: String,
    behavior: StubBehavior,
    init_calls: AtomicU32,
    upload_calls: AtomicU32,
    status_calls: AtomicU32,
    init_headers: Mutex<Option<HeaderMap>>,
    init_body: Mutex<Option<serde_json::Value>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    sessions: Mutex<HashMap<String, StubSession>>,
    files: Mutex<HashMap<String, StubFile>>,
}

/// Running stub server
pub struct ProviderStub {
    pub base_url: String,
    state: Arc<StubState>,
}

impl ProviderStub {
    pub async fn start(behavior: StubBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(StubState {
            base_url: base_url.clone(),
            behavior,
            ..StubState::default()
        });

        let app = Router::new()
            .route("/upload/v1beta/files", post(init_upload))
            .route("/upload-session/:session", post(transfer))
            .route("/v1beta/files/:id", get(file_status))
            .route("/media/:name", get(media))
            .layer(DefaultBodyLimit::disable())
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    pub fn init_calls(&self) -> u32 {
        self.state.init_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u32 {
        self.state.upload_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.state.status_calls.load(Ordering::SeqCst)
    }

    pub fn init_header(&self, name: &str) -> Option<String> {
        self.state
            .init_headers
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|headers| headers.get(name))
            .and_then(|value| value.to_str().ok())
            .map(String::from)
    }

    pub fn init_body(&self) -> Option<serde_json::Value> {
        self.state.init_body.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn media_url(&self, name: &str) -> String {
        format!("{}/media/{}", self.base_url, name)
    }

    /// Play the browser's part of a direct upload: send `body` to the
    /// session URL with upload+finalize, returning the file resource
    pub async fn browser_upload(&self, upload_url: &str, body: Vec<u8>) -> serde_json::Value {
        reqwest::Client::new()
            .post(upload_url)
            .header("x-goog-upload-offset", "0")
            .header("x-goog-upload-command", "upload, finalize")
            .body(body)
            .send()
            .await
            .unwrap()
            .json::<serde_json::Value>()
            .await
            .unwrap()["file"]
            .clone()
    }
}

async fn init_upload(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let call = state.init_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let session = StubSession {
        display_name: body["file"]["display_name"].as_str().unwrap_or_default().to_string(),
        mime_type: headers
            .get("x-goog-upload-header-content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };
    state.sessions.lock().unwrap().insert(call.to_string(), session);
    *state.init_headers.lock().unwrap() = Some(headers);
    *state.init_body.lock().unwrap() = Some(body);

    if let Some(status) = state.behavior.init_status {
        return (StatusCode::from_u16(status).unwrap(), "init refused").into_response();
    }

    if state.behavior.omit_upload_url {
        return (StatusCode::OK, "{}").into_response();
    }

    let upload_url = format!("{}/upload-session/{}", state.base_url, call);
    (StatusCode::OK, [("x-goog-upload-url", upload_url)], "{}").into_response()
}

async fn transfer(
    State(state): State<Arc<StubState>>,
    Path(session): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.upload_calls.fetch_add(1, Ordering::SeqCst);
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
    };
    state.uploads.lock().unwrap().push(RecordedUpload {
        command: header("x-goog-upload-command"),
        offset: header("x-goog-upload-offset"),
        body_len: body.len(),
    });

    if let Some(status) = state.behavior.upload_status {
        return (StatusCode::from_u16(status).unwrap(), "transfer refused").into_response();
    }

    let Some(opened) = state.sessions.lock().unwrap().get(&session).cloned() else {
        return (StatusCode::NOT_FOUND, "no such upload session").into_response();
    };
    let name = format!("files/stub-{}", session);
    state.files.lock().unwrap().insert(
        name.clone(),
        StubFile {
            display_name: opened.display_name,
            mime_type: opened.mime_type.clone(),
            size_bytes: body.len(),
        },
    );

    Json(json!({
        "file": {
            "name": name,
            "uri": format!("{}/v1beta/{}", state.base_url, name),
            "mimeType": opened.mime_type,
            "sizeBytes": body.len().to_string(),
            "state": "PROCESSING"
        }
    }))
    .into_response()
}

async fn file_status(State(state): State<Arc<StubState>>, Path(id): Path<String>) -> Response {
    let check = state.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let behavior = &state.behavior;

    let name = format!("files/{}", id);
    let Some(file) = state.files.lock().unwrap().get(&name).cloned() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "status": "NOT_FOUND" } })),
        )
            .into_response();
    };

    let file_state = if behavior.fail_at_check == Some(check) {
        "FAILED"
    } else if behavior.ready_at_check.map(|k| check >= k).unwrap_or(false) {
        "ACTIVE"
    } else {
        "PROCESSING"
    };

    Json(json!({
        "name": name,
        "displayName": file.display_name,
        "uri": format!("{}/v1beta/{}", state.base_url, name),
        "mimeType": file.mime_type,
        "sizeBytes": file.size_bytes.to_string(),
        "state": file_state
    }))
    .into_response()
}

async fn media(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "clip.mp4" => (
            StatusCode::OK,
            [("content-type", "video/mp4")],
            Bytes::from_static(CLIP_BYTES),
        )
            .into_response(),
        "empty.mp4" => (StatusCode::OK, [("content-type", "video/mp4")], Bytes::new()).into_response(),
        "huge.mp4" => {
            // Declares 150 MB, never sends a byte
            let stream = async_stream::stream! {
                std::future::pending::<()>().await;
                yield Ok::<Bytes, std::io::Error>(Bytes::new());
            };
            (
                StatusCode::OK,
                [
                    ("content-type", "video/mp4".to_string()),
                    ("content-length", (150u64 * 1024 * 1024).to_string()),
                ],
                Body::from_stream(stream),
            )
                .into_response()
        }
        "page" => (
            StatusCode::OK,
            [("content-type", "text/html")],
            "<html>not a video</html>",
        )
            .into_response(),
        // Media-looking link that lands on an HTML page
        "redirect.mp4" => (StatusCode::FOUND, [("location", "/media/page")]).into_response(),
        // Media-looking link that lands on real media
        "hop.mp4" => (StatusCode::FOUND, [("location", "/media/clip.mp4")]).into_response(),
        "chunked.mp4" => {
            // No Content-Length, 4 KiB in 1 KiB chunks
            let stream = async_stream::stream! {
                for _ in 0..4 {
                    yield Ok::<Bytes, std::io::Error>(Bytes::from(vec![7u8; 1024]));
                }
            };
            (StatusCode::OK, Body::from_stream(stream)).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

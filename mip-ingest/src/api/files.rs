//! File record API handlers
//!
//! GET /files, GET /files/:id - scoped to the requesting tenant

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::tenant::RequestTenant;
use crate::error::{ApiError, ApiResult};
use crate::models::PersistedFileRecord;
use crate::AppState;

/// GET /files response
#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<PersistedFileRecord>,
    pub count: usize,
}

/// GET /files
pub async fn list_files(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
) -> ApiResult<Json<FileListResponse>> {
    let files = state.files.list_for_tenant(&tenant).await?;
    Ok(Json(FileListResponse {
        count: files.len(),
        files,
    }))
}

/// GET /files/:id
pub async fn get_file(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PersistedFileRecord>> {
    state
        .files
        .get_for_tenant(&tenant, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("File {}", id)))
}

/// Build file record routes
pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/:id", get(get_file))
}

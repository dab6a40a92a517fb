//! Folder download endpoints (/api/folder, /api/zip)

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::AppState;
use crate::services::archive;
use crate::services::error::ApiError;
use crate::services::headers;
use crate::storage::folder_prefix;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/folder", get(folder))
        .route("/api/zip", get(folder))
}

#[derive(Debug, Deserialize)]
struct FolderQuery {
    folder: Option<String>,
}

/// GET /api/folder?folder=<prefix> - Download a folder as a zip
async fn folder(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FolderQuery>,
) -> Result<Response, ApiError> {
    let folder = query
        .folder
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing folder parameter"))?;
    zip_response(&state, &folder).await
}

/// Zip everything under `raw_folder`. 404 when nothing would go in the archive.
pub async fn zip_response(state: &AppState, raw_folder: &str) -> Result<Response, ApiError> {
    let prefix = folder_prefix(raw_folder)?;
    let objects = state.data_store.list(&prefix).await?;

    if !objects
        .iter()
        .any(|o| archive::entry_name(&prefix, &o.name).is_some())
    {
        return Err(ApiError::not_found("Folder not found or empty"));
    }

    let zip_name = archive::zip_file_name(&prefix);
    info!(prefix, objects = objects.len(), zip_name, "Folder download");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    response_headers.insert(header::CONTENT_DISPOSITION, headers::attachment(&zip_name));

    let stream = archive::zip_stream(state.data_store.clone(), prefix, objects);
    Ok((StatusCode::OK, response_headers, Body::from_stream(stream)).into_response())
}

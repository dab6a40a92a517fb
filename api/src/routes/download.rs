//! File download endpoints (/api/download, /api/file)

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
use crate::services::error::{ApiError, LogErr};
use crate::services::headers;
use crate::storage::{ObjectStore, guess_content_type, sanitize_key};
use super::folder::zip_response;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/download", get(download))
        .route("/download", get(download))
        .route("/api/file", get(file))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    file: Option<String>,
    folder: Option<String>,
}

/// How the Content-Type of a download is chosen
#[derive(Debug, Clone, Copy)]
enum ContentTypeMode {
    /// Always `application/octet-stream`
    Binary,
    /// Stored content type, else the extension's
    Inferred,
}

/// GET /api/download?file=<key> | ?folder=<prefix>
async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    if let Some(folder) = query.folder.filter(|f| !f.is_empty()) {
        return zip_response(&state, &folder).await;
    }
    if let Some(file) = query.file.filter(|f| !f.is_empty()) {
        return attachment_response(state.data_store.as_ref(), &file, ContentTypeMode::Binary).await;
    }
    Err(ApiError::bad_request("Missing file or folder parameter"))
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    file: Option<String>,
}

/// GET /api/file?file=<key> - Download with the file's own content type
async fn file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let file = query
        .file
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing file"))?;
    attachment_response(state.data_store.as_ref(), &file, ContentTypeMode::Inferred).await
}

async fn attachment_response(
    store: &dyn ObjectStore,
    raw_key: &str,
    mode: ContentTypeMode,
) -> Result<Response, ApiError> {
    let key = sanitize_key(raw_key)?;
    let object = store
        .stat(&key)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let content_type = match mode {
        ContentTypeMode::Binary => "application/octet-stream".to_string(),
        ContentTypeMode::Inferred => object
            .content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(&key)),
    };

    // Headers are settled before the first byte is read
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type).log_500("Invalid content type")?,
    );
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        headers::attachment(headers::basename(&key)),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size));

    let stream = store.read(&key, None).await?;
    info!(key, size = object.size, "Download");

    Ok((StatusCode::OK, response_headers, Body::from_stream(stream)).into_response())
}

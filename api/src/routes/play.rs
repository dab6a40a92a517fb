//! Audio playback with byte-range support (/api/play, /audio)

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
use tracing::debug;

use crate::AppState;
use crate::services::error::{ApiError, LogErr};
use crate::services::headers::audio_content_type;
use crate::services::range::{self, RangeRequest};
use crate::storage::sanitize_key;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/play", get(play))
        .route("/audio", get(play))
}

#[derive(Debug, Deserialize)]
struct PlayQuery {
    file: Option<String>,
}

/// GET /api/play?file=<key> - Stream audio, honouring `Range`
async fn play(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlayQuery>,
    request_headers: HeaderMap,
) -> Result<Response, ApiError> {
    let file = query
        .file
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing file parameter"))?;
    let key = sanitize_key(&file)?;

    let object = state
        .data_store
        .stat(&key)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;
    let size = object.size;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&audio_content_type(&key)).log_500("Invalid content type")?,
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    match range::resolve(request_headers.get(header::RANGE), size) {
        RangeRequest::Full => {
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            let stream = state.data_store.read(&key, None).await?;
            Ok((StatusCode::OK, response_headers, Body::from_stream(stream)).into_response())
        }
        RangeRequest::Partial(range) => {
            debug!(key, start = range.start, end = range.end, size, "Range request");
            response_headers.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes {}-{}/{}", range.start, range.end, size))
                    .log_500("Invalid Content-Range")?,
            );
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
            let stream = state.data_store.read(&key, Some(range)).await?;
            Ok((
                StatusCode::PARTIAL_CONTENT,
                response_headers,
                Body::from_stream(stream),
            )
                .into_response())
        }
        RangeRequest::Unsatisfiable => Err(ApiError::RangeNotSatisfiable { size }),
    }
}

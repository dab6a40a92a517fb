//! Error handling utilities for route handlers

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::storage::StoreError;

/// Errors a handler can answer with. Rendered as plain text; wrap in
/// [`JsonApiError`] for `{"error": ...}` bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Range not satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn content_range(&self) -> Option<HeaderValue> {
        match self {
            ApiError::RangeNotSatisfiable { size } => {
                HeaderValue::from_str(&format!("bytes */{size}")).ok()
            }
            _ => None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::not_found("File not found"),
            StoreError::InvalidKey(key) => {
                warn!("Rejected object key {:?}", key);
                ApiError::bad_request("Invalid path")
            }
            other => {
                error!("Storage error: {}", other);
                ApiError::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), self.to_string()).into_response();
        if let Some(value) = self.content_range() {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
        response
    }
}

/// JSON flavour of [`ApiError`], for the config and upload endpoints.
#[derive(Debug)]
pub struct JsonApiError(pub ApiError);

impl From<ApiError> for JsonApiError {
    fn from(err: ApiError) -> Self {
        JsonApiError(err)
    }
}

impl From<StoreError> for JsonApiError {
    fn from(err: StoreError) -> Self {
        JsonApiError(err.into())
    }
}

impl IntoResponse for JsonApiError {
    fn into_response(self) -> Response {
        (
            self.0.status_code(),
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Extension trait for logging errors and converting to ApiError
pub trait LogErr<T> {
    /// Log error with context and return a generic 500
    fn log_500(self, context: &str) -> Result<T, ApiError>;

    /// Log error with context and return the given error
    fn log_status(self, context: &str, err: ApiError) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            error!("{}: {}", context, e);
            ApiError::internal("Internal server error")
        })
    }

    fn log_status(self, context: &str, err: ApiError) -> Result<T, ApiError> {
        self.map_err(|e| {
            warn!("{}: {}", context, e);
            err
        })
    }
}

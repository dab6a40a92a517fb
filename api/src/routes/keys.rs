//! Selected keys configuration blob (/api/keys, /api/selectedKeys)

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::AppState;
use crate::constants::SELECTED_KEYS_OBJECT;
use crate::services::error::{ApiError, JsonApiError, LogErr};
use crate::storage::download_object;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/keys", get(get_keys).put(put_keys))
        .route("/api/selectedKeys", get(get_keys).put(put_keys))
}

/// GET /api/keys - Current selectedKeys.json
async fn get_keys(State(state): State<Arc<AppState>>) -> Result<Json<Value>, JsonApiError> {
    let store = state.config_store.as_ref();
    if store.stat(SELECTED_KEYS_OBJECT).await?.is_none() {
        return Err(ApiError::not_found("File not found").into());
    }

    let contents = download_object(store, SELECTED_KEYS_OBJECT).await?;
    let json: Value = serde_json::from_slice(&contents).log_500("Parse selectedKeys.json error")?;
    Ok(Json(json))
}

/// PUT /api/keys - Replace selectedKeys.json; `selectedKeys` must be an array
async fn put_keys(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, JsonApiError> {
    let invalid = || ApiError::bad_request("selectedKeys must be an array");

    let json: Value = serde_json::from_slice(&body).map_err(|_| invalid())?;
    if !json.get("selectedKeys").is_some_and(Value::is_array) {
        return Err(invalid().into());
    }

    let pretty = serde_json::to_vec_pretty(&json).log_500("Serialize selectedKeys error")?;
    state
        .config_store
        .write(SELECTED_KEYS_OBJECT, pretty.into(), "application/json")
        .await?;

    info!("Saved {}", SELECTED_KEYS_OBJECT);
    Ok(StatusCode::NO_CONTENT)
}

//! Folder tree listing (/api/list)

use axum::{Json, Router, extract::State, routing::get};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::AppState;
use crate::constants::FILES_MANIFEST_OBJECT;
use crate::services::error::{ApiError, JsonApiError};
use crate::services::tree::build_tree;
use crate::storage::download_object;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/list", get(list))
}

fn load_failed() -> JsonApiError {
    ApiError::internal("Failed to load files.json").into()
}

/// GET /api/list - Whole folder tree; a stored files.json wins over a live listing
async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Value>, JsonApiError> {
    let store = state.data_store.as_ref();

    let manifest = store.stat(FILES_MANIFEST_OBJECT).await.map_err(|e| {
        error!("Manifest lookup error: {}", e);
        load_failed()
    })?;

    if manifest.is_some() {
        let contents = download_object(store, FILES_MANIFEST_OBJECT).await.map_err(|e| {
            error!("Manifest read error: {}", e);
            load_failed()
        })?;
        let tree: Value = serde_json::from_slice(&contents).map_err(|e| {
            error!("Manifest parse error: {}", e);
            load_failed()
        })?;
        return Ok(Json(tree));
    }

    let objects = store.list("").await.map_err(|e| {
        error!("Listing error: {}", e);
        load_failed()
    })?;
    debug!(count = objects.len(), "Building tree from listing");

    Ok(Json(build_tree(objects.iter().map(|o| o.name.as_str()))))
}

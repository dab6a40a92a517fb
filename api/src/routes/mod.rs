pub mod download;
pub mod folder;
pub mod keys;
pub mod list;
pub mod play;
pub mod proxy;
pub mod upload;

use axum::{
    Router,
    extract::Request,
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(download::routes())
        .merge(folder::routes())
        .merge(keys::routes())
        .merge(list::routes())
        .merge(play::routes())
        .merge(proxy::routes())
        .merge(upload::routes())
        .route_layer(middleware::from_fn(answer_options))
}

/// Preflights are answered by the CORS layer; any other OPTIONS on a known
/// route gets an empty 200.
async fn answer_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

async fn health() -> &'static str {
    "ok"
}

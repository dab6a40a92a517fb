//! Fetch-through proxy for remote files (/api/proxy)

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::AppState;
use crate::services::error::{ApiError, LogErr};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/proxy", get(proxy))
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

/// GET /api/proxy?url=<url> - Fetch a remote file and relay it buffered
async fn proxy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response, ApiError> {
    let raw = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing URL"))?;

    let url = reqwest::Url::parse(&raw).map_err(|_| ApiError::bad_request("Invalid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::bad_request("Invalid URL"));
    }

    let fetch_failed = || ApiError::internal("Error fetching file");

    let upstream = state
        .http
        .get(url)
        .send()
        .await
        .log_status("Proxy fetch error", fetch_failed())?;

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let body = upstream
        .bytes()
        .await
        .log_status("Proxy body error", fetch_failed())?;

    debug!(%status, bytes = body.len(), "Proxied");
    Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::{StatusCode, header};
    use axum::{Router, routing::get};

    async fn upstream() -> String {
        let app = Router::new()
            .route("/score.pdf", get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], "%PDF-1.7") }))
            .route("/raw", get(|| async { axum::body::Bytes::from_static(b"raw") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_proxy_relays_body_and_type() {
        let base = upstream().await;
        let app = TestApp::new();

        let (status, headers, body) = app.get(&format!("/api/proxy?url={base}/score.pdf")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(&body[..], b"%PDF-1.7");

        let (status, headers, _) = app.get(&format!("/api/proxy?url={base}/raw")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn test_proxy_forwards_upstream_status() {
        let base = upstream().await;
        let app = TestApp::new();
        let (status, _, _) = app.get(&format!("/api/proxy?url={base}/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_proxy_validation() {
        let app = TestApp::new();

        let (status, _, body) = app.get("/api/proxy").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(&body[..], b"Missing URL");

        let (status, _, _) = app.get("/api/proxy?url=file:///etc/passwd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_proxy_unreachable_host() {
        let app = TestApp::new();
        let (status, _, body) = app.get("/api/proxy?url=http://127.0.0.1:1/x").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&body[..], b"Error fetching file");
    }
}

mod config;
mod constants;
mod routes;
mod services;
mod storage;

use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, StorageConfig};
use constants::PROXY_TIMEOUT_SECS;
use storage::{GcsStore, LocalStore, ObjectStore};

#[derive(Clone)]
pub struct AppState {
    /// Browsable files
    pub data_store: Arc<dyn ObjectStore>,
    /// Holds selectedKeys.json
    pub config_store: Arc<dyn ObjectStore>,
    /// Client for the proxy endpoint
    pub http: reqwest::Client,
}

async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let (data_store, config_store): (Arc<dyn ObjectStore>, Arc<dyn ObjectStore>) =
        match &config.storage {
            StorageConfig::Local {
                data_path,
                config_path,
            } => {
                info!("Local storage: data {:?}, config {:?}", data_path, config_path);
                (
                    Arc::new(LocalStore::new(data_path)?),
                    Arc::new(LocalStore::new(config_path)?),
                )
            }
            StorageConfig::Gcs {
                data_bucket,
                config_bucket,
            } => {
                info!("GCS storage: data bucket {}, config bucket {}", data_bucket, config_bucket);
                let (storage, control) = storage::connect_clients().await?;
                (
                    Arc::new(GcsStore::new(storage.clone(), control.clone(), data_bucket)),
                    Arc::new(GcsStore::new(storage, control, config_bucket)),
                )
            }
        };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(PROXY_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")?;

    Ok(AppState {
        data_store,
        config_store,
        http,
    })
}

fn build_app(state: Arc<AppState>, config: &Config) -> Router {
    routes::build_routes()
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(services::cors::cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received terminate signal, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bucket_browser=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let state = Arc::new(build_state(&config).await?);
    let app = build_app(state, &config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

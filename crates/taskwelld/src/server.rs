//! HTTP server for taskwelld.

use crate::routes;
use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use taskwell_common::config::Config;
use taskwell_common::lifecycle::UpdateLifecycle;
use taskwell_common::Store;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers.
pub struct AppState {
    pub store: Store,
    pub lifecycle: UpdateLifecycle,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        let lifecycle = UpdateLifecycle::new(store.clone());
        Self {
            store,
            lifecycle,
            config,
        }
    }
}

/// Build the full router. Separated from [`run`] so tests can drive it
/// without a listener.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::auth_routes())
        .merge(routes::task_routes())
        .merge(routes::update_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_credentials(true)
}

/// Run the HTTP server until shutdown.
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config.bind_addr.clone();
    let state = Arc::new(state);
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}

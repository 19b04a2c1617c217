//! Web server: axum read API for the propagation map.
//!
//! Shared state is just the store path and query defaults; each request opens
//! its own read connection on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use aprs_core::propagation::PropagationParams;

pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub db_path: PathBuf,
    pub params: PropagationParams,
    /// Window used when a request gives no `hours`.
    pub default_hours: f64,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/map/propagation-data", get(routes::api_propagation_data))
        .route("/api/map/aprs-locations", get(routes::api_aprs_locations))
        .route("/api/stats", get(routes::api_stats))
        .with_state(state)
        .layer(cors)
}

/// Run the web server until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(Arc::new(state));
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("APRS propagation server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

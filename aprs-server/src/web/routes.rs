//! REST API route handlers.
//!
//! Handlers never fail on missing data: an absent or unreadable store yields
//! empty payloads. The replay runs on the blocking pool.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use aprs_core::types::{now, Window};

use crate::api;
use crate::web::AppState;

/// The only propagation source this server computes.
pub const SOURCE_VHF_APRS: &str = "vhf_aprs";

// ---------------------------------------------------------------------------
// Query param types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PropagationParamsQuery {
    source: Option<String>,
    hours: Option<f64>,
}

#[derive(Deserialize)]
pub struct LocationParams {
    hours: Option<f64>,
}

// ---------------------------------------------------------------------------
// Map endpoints
// ---------------------------------------------------------------------------

/// GET /api/map/propagation-data?source=vhf_aprs&hours=H
pub async fn api_propagation_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PropagationParamsQuery>,
) -> Response {
    debug!(source = ?params.source, hours = ?params.hours, "GET /api/map/propagation-data");
    if params.source.as_deref() != Some(SOURCE_VHF_APRS) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid source", "coordinates": [], "valueLabel": ""})),
        )
            .into_response();
    }

    let window = Window::from_hours(params.hours, state.default_hours);
    let result = tokio::task::spawn_blocking(move || {
        api::propagation_overlay(&state.db_path, window, now(), state.params)
    })
    .await;

    match result {
        Ok(overlay) => Json(overlay).into_response(),
        Err(e) => {
            debug!("propagation task failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Failed to fetch propagation data",
                    "coordinates": [],
                    "valueLabel": ""
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/map/aprs-locations?hours=H
pub async fn api_aprs_locations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocationParams>,
) -> Response {
    debug!(hours = ?params.hours, "GET /api/map/aprs-locations");
    let window = Window::from_hours(params.hours, state.default_hours);
    let result =
        tokio::task::spawn_blocking(move || api::locations(&state.db_path, window, now())).await;

    match result {
        Ok(locs) => Json(locs).into_response(),
        Err(e) => {
            debug!("locations task failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "Failed to fetch APRS locations", "locations": []})),
            )
                .into_response()
        }
    }
}

/// GET /api/stats: packet count and capture-time range.
pub async fn api_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = tokio::task::spawn_blocking(move || api::stats(&state.db_path))
        .await
        .map(|s| serde_json::to_value(s).unwrap_or(json!({})))
        .unwrap_or(json!({"count": 0, "oldest": null, "newest": null}));
    Json(stats)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

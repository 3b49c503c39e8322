// Engine status route

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::broadcaster::ConnectionStats;

use super::AppState;

/// Engine status snapshot
#[derive(Debug, Serialize, ToSchema)]
pub struct EngineStatus {
    pub name: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub active_connections: usize,
    pub current_sequence: i64,
    /// Which secret-store backend holds the auth token
    pub secret_store: String,
    pub connections: Vec<ConnectionStats>,
}

/// GET /v1/engine/status - engine version, uptime, and delivery stats
#[utoipa::path(
    get,
    path = "/v1/engine/status",
    responses(
        (status = 200, description = "Engine status", body = EngineStatus),
        (status = 401, description = "Missing or invalid auth token"),
        (status = 429, description = "Rate limited")
    ),
    tag = "engine"
)]
pub async fn engine_status(State(state): State<AppState>) -> Result<Json<EngineStatus>, StatusCode> {
    let current_sequence = state.store.current_sequence().await.map_err(|e| {
        tracing::error!(error = %e, "failed to read current sequence");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(EngineStatus {
        name: "Lantern Engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        active_connections: state.broadcaster.connection_count(),
        current_sequence,
        secret_store: state.secret_store_kind.clone(),
        connections: state.broadcaster.connection_stats(),
    }))
}

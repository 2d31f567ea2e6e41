//! Liveness and readiness probes.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

/// `GET /health` — process liveness.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /ready` — dependency readiness. Pings the database when one is
/// configured; a fake-backed server (tests) is always ready.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Some(pool) = &state.db {
        if let Err(err) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!(error = %err, "readiness check failed");
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }
    Ok(Json(json!({ "status": "ready" })))
}

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new().route("/health", get(health))
}

// GET /health
async fn health(State(state): State<Arc<crate::AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = state.db.ping().await.is_ok();
    let redis = state.redis.ping().await.is_ok();

    // Redis only backs caches and locks, so losing it degrades but does not fail us.
    let status = if database { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "status": if database && redis { "ok" } else { "degraded" },
            "database": database,
            "redis": redis,
        })),
    )
}

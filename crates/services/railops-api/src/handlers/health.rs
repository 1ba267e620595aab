use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// GET /health — liveness for deploys and the desktop helper's reachability
/// probe.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /metrics — prometheus text exposition.
pub async fn metrics_handler() -> String {
    crate::metrics::render()
}

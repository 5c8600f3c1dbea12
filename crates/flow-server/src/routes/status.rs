use axum::Json;
use serde_json::{json, Value};

/// GET /api/agents/status — the pipeline never queues, so this is constant.
pub async fn pipeline_status() -> Json<Value> {
    Json(json!({
        "is_active": true,
        "current_agent": "Idle",
        "queue_depth": 0,
    }))
}

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

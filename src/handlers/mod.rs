pub mod metrics;
pub mod payments;
pub mod payments_summary;

use axum::response::Json;
use chrono::{SecondsFormat, Utc};

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}

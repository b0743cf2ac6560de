use axum::{extract::Extension, Json};
use serde_json::{json, Value};

use crate::app::ServerInfo;

/// Liveness message.
pub async fn index(Extension(info): Extension<ServerInfo>) -> Json<Value> {
    Json(json!({
        "message": format!("ticketing API is running on port {}", info.port),
    }))
}

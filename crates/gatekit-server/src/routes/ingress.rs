//! Public edge: inbound platform webhooks and health

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::error::ApiResult;
use crate::state::AppState;

/// `POST /api/v1/webhooks/:platform/:webhookToken` — inbound dispatch.
/// Public by token; everything else is the registry's problem.
pub async fn platform_webhook(
    State(state): State<AppState>,
    Path((platform, webhook_token)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut header_map = HashMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_lowercase(), value.to_string());
        }
    }

    let response = state
        .registry
        .dispatch_webhook(&platform, &webhook_token, body, header_map)
        .await?;
    Ok(Json(response))
}

/// `GET /api/v1/health` — aggregated adapter health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.registry.health().await;
    Json(serde_json::json!({
        "status": if health.healthy { "healthy" } else { "degraded" },
        "platforms": health.providers,
    }))
}

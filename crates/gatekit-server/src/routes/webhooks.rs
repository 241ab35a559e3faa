//! Webhook-subscriber routes

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use gatekit_core::{EventKind, GatewayError, Pagination, Principal, Webhook};
use gatekit_store::{DeliveryFilter, WebhookStore};

use crate::auth::{resolve_project, ProjectAccess};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhookBody {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchWebhookBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryQuery {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Validate an event list against the catalog
fn validate_events(events: &[String]) -> ApiResult<()> {
    if events.is_empty() {
        return Err(ApiError(GatewayError::validation(
            "events",
            "must not be empty",
        )));
    }
    for event in events {
        event.parse::<EventKind>().map_err(ApiError)?;
    }
    Ok(())
}

fn validate_url(url: &str) -> ApiResult<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ApiError(GatewayError::validation(
            "url",
            "must be an http(s) URL",
        )));
    }
    Ok(())
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Secrets stay write-only after registration
fn webhook_view(webhook: &Webhook) -> serde_json::Value {
    json!({
        "id": webhook.id,
        "name": webhook.name,
        "url": webhook.url,
        "events": webhook.events,
        "isActive": webhook.is_active,
        "createdAt": webhook.created_at,
    })
}

async fn owned_webhook(state: &AppState, project_id: &str, webhook_id: &str) -> ApiResult<Webhook> {
    state
        .store
        .webhook_by_id(webhook_id)
        .await?
        .filter(|w| w.project_id == project_id)
        .ok_or_else(|| ApiError(GatewayError::NotFound("webhook".into())))
}

/// `POST /api/v1/projects/:project/webhooks` — the secret is returned only
/// here, generated when the caller omits it.
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Json(body): Json<CreateWebhookBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;

    if body.name.trim().is_empty() {
        return Err(ApiError(GatewayError::validation("name", "must not be empty")));
    }
    validate_url(&body.url)?;
    validate_events(&body.events)?;

    let secret = body.secret.unwrap_or_else(generate_secret);
    let webhook = state
        .store
        .insert_webhook(Webhook {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            name: body.name,
            url: body.url,
            events: body.events,
            secret: secret.clone(),
            is_active: true,
            created_at: Utc::now(),
        })
        .await?;

    let mut view = webhook_view(&webhook);
    view["secret"] = json!(secret);
    Ok(Json(view))
}

/// `GET /api/v1/projects/:project/webhooks`
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let webhooks = state.store.list_webhooks(&project.id).await?;
    Ok(Json(json!({
        "webhooks": webhooks.iter().map(webhook_view).collect::<Vec<_>>(),
    })))
}

/// `GET /api/v1/projects/:project/webhooks/:webhookId`
pub async fn get_webhook(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, webhook_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let webhook = owned_webhook(&state, &project.id, &webhook_id).await?;
    Ok(Json(webhook_view(&webhook)))
}

/// `PATCH /api/v1/projects/:project/webhooks/:webhookId`
pub async fn patch_webhook(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, webhook_id)): Path<(String, String)>,
    Json(body): Json<PatchWebhookBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let mut webhook = owned_webhook(&state, &project.id, &webhook_id).await?;

    if let Some(name) = body.name {
        webhook.name = name;
    }
    if let Some(url) = body.url {
        validate_url(&url)?;
        webhook.url = url;
    }
    if let Some(events) = body.events {
        validate_events(&events)?;
        webhook.events = events;
    }
    if let Some(is_active) = body.is_active {
        webhook.is_active = is_active;
    }

    let webhook = state.store.update_webhook(webhook).await?;
    Ok(Json(webhook_view(&webhook)))
}

/// `DELETE /api/v1/projects/:project/webhooks/:webhookId`
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, webhook_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let webhook = owned_webhook(&state, &project.id, &webhook_id).await?;
    state.store.delete_webhook(&webhook.id).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// `GET /api/v1/projects/:project/webhooks/:webhookId/deliveries`
pub async fn list_deliveries(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, webhook_id)): Path<(String, String)>,
    Query(query): Query<DeliveryQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let webhook = owned_webhook(&state, &project.id, &webhook_id).await?;

    let status = match query.status.as_deref() {
        None => None,
        Some("pending") => Some(gatekit_core::WebhookDeliveryStatus::Pending),
        Some("success") => Some(gatekit_core::WebhookDeliveryStatus::Success),
        Some("failed") => Some(gatekit_core::WebhookDeliveryStatus::Failed),
        Some(other) => {
            return Err(ApiError(GatewayError::validation(
                "status",
                format!("unknown status `{other}`"),
            )));
        }
    };
    if let Some(event) = &query.event {
        event.parse::<EventKind>().map_err(ApiError)?;
    }

    let page = Pagination::from_query(query.limit, query.offset)?;
    let deliveries = state
        .store
        .list_deliveries(
            &webhook.id,
            &DeliveryFilter {
                event: query.event,
                status,
            },
            page,
        )
        .await?;
    Ok(Json(json!({
        "deliveries": deliveries,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

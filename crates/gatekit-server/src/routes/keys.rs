//! API-key routes

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use gatekit_core::Principal;

use crate::auth::{resolve_project, ProjectAccess};
use crate::error::ApiResult;
use crate::services::{ApiKeyService, MintedKey};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyBody {
    pub name: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

/// The only response shapes that ever carry key plaintext
fn minted_view(minted: &MintedKey) -> serde_json::Value {
    json!({
        "id": minted.record.id,
        "key": minted.plaintext,
        "name": minted.record.name,
        "prefix": minted.record.key_prefix,
        "scopes": minted.record.scopes,
        "expiresAt": minted.record.expires_at,
        "createdAt": minted.record.created_at,
    })
}

/// `POST /api/v1/projects/:project/keys`
pub async fn create_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Json(body): Json<CreateKeyBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;

    let created_by = match &principal {
        Principal::Jwt { user_id, .. } => Some(user_id.clone()),
        Principal::ApiKey { key_id, .. } => Some(key_id.clone()),
    };
    let minted = ApiKeyService::new(state.store.clone())
        .create(&project, &body.name, body.scopes, body.expires_in_days, created_by)
        .await?;
    Ok(Json(minted_view(&minted)))
}

/// `GET /api/v1/projects/:project/keys` — masked, never the hash
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let keys = ApiKeyService::new(state.store.clone())
        .list(&project.id)
        .await?;

    let views: Vec<serde_json::Value> = keys
        .iter()
        .map(|key| {
            json!({
                "id": key.id,
                "name": key.name,
                "maskedKey": key.masked(),
                "scopes": key.scopes,
                "expiresAt": key.expires_at,
                "revokedAt": key.revoked_at,
                "lastUsedAt": key.last_used_at,
                "createdAt": key.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "keys": views })))
}

/// `DELETE /api/v1/projects/:project/keys/:keyId` — idempotent revoke
pub async fn revoke_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, key_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let key = ApiKeyService::new(state.store.clone())
        .revoke(&project.id, &key_id)
        .await?;
    Ok(Json(json!({ "revoked": true, "revokedAt": key.revoked_at })))
}

/// `POST /api/v1/projects/:project/keys/:keyId/roll` — 24h dual-live
pub async fn roll_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, key_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let minted = ApiKeyService::new(state.store.clone())
        .roll(&project, &key_id)
        .await?;
    Ok(Json(minted_view(&minted)))
}

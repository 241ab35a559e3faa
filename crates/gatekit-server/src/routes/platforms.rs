//! Platform-config routes
//!
//! Credentials go in as plaintext JSON and are stored only encrypted; no
//! response ever carries them back. Lifecycle transitions propagate to the
//! registry so adapters can register webhooks and tear down connections.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use gatekit_core::{GatewayError, PlatformConfig, PlatformLifecycleKind, Principal};
use gatekit_store::PlatformConfigStore;

use crate::auth::{resolve_project, ProjectAccess};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlatformBody {
    pub platform: String,
    pub credentials: serde_json::Value,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub test_mode: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPlatformBody {
    #[serde(default)]
    pub credentials: Option<serde_json::Value>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub test_mode: Option<bool>,
}

fn config_view(state: &AppState, config: &PlatformConfig) -> serde_json::Value {
    json!({
        "id": config.id,
        "platform": config.platform,
        "isActive": config.is_active,
        "testMode": config.test_mode,
        "webhookUrl": state.config.webhook_url(&config.platform, &config.webhook_token),
        "createdAt": config.created_at,
        "updatedAt": config.updated_at,
    })
}

/// `POST /api/v1/projects/:project/platforms`
pub async fn create_platform(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Json(body): Json<CreatePlatformBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;

    if state.registry.get(&body.platform).is_none() {
        return Err(ApiError(GatewayError::validation(
            "platform",
            format!(
                "unknown platform `{}`; available: {:?}",
                body.platform,
                state.registry.platform_names()
            ),
        )));
    }
    if !body.credentials.is_object() {
        return Err(ApiError(GatewayError::validation(
            "credentials",
            "must be an object",
        )));
    }

    let now = Utc::now();
    let config = state
        .store
        .insert_platform(PlatformConfig {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            platform: body.platform,
            credentials_encrypted: state.cipher.encrypt(&body.credentials)?,
            webhook_token: Uuid::new_v4().to_string(),
            is_active: body.is_active,
            test_mode: body.test_mode,
            created_at: now,
            updated_at: now,
        })
        .await?;

    state
        .registry
        .dispatch_lifecycle(PlatformLifecycleKind::Created, &config)
        .await?;

    Ok(Json(config_view(&state, &config)))
}

/// `GET /api/v1/projects/:project/platforms`
pub async fn list_platforms(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let configs = state.store.list_platforms(&project.id).await?;
    Ok(Json(json!({
        "platforms": configs.iter().map(|c| config_view(&state, c)).collect::<Vec<_>>(),
    })))
}

async fn owned_config(
    state: &AppState,
    project_id: &str,
    platform_id: &str,
) -> ApiResult<PlatformConfig> {
    state
        .store
        .platform_by_id(platform_id)
        .await?
        .filter(|c| c.project_id == project_id)
        .ok_or_else(|| ApiError(GatewayError::NotFound("platform config".into())))
}

/// `GET /api/v1/projects/:project/platforms/:platformId`
pub async fn get_platform(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, platform_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let config = owned_config(&state, &project.id, &platform_id).await?;
    Ok(Json(config_view(&state, &config)))
}

/// `PATCH /api/v1/projects/:project/platforms/:platformId`
pub async fn patch_platform(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, platform_id)): Path<(String, String)>,
    Json(body): Json<PatchPlatformBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let mut config = owned_config(&state, &project.id, &platform_id).await?;

    let credentials_changed = if let Some(credentials) = body.credentials {
        if !credentials.is_object() {
            return Err(ApiError(GatewayError::validation(
                "credentials",
                "must be an object",
            )));
        }
        config.credentials_encrypted = state.cipher.encrypt(&credentials)?;
        true
    } else {
        false
    };

    let activity_change = body.is_active.filter(|next| *next != config.is_active);
    if let Some(next) = activity_change {
        config.is_active = next;
    }
    if let Some(test_mode) = body.test_mode {
        config.test_mode = test_mode;
    }
    config.updated_at = Utc::now();

    let config = state.store.update_platform(config).await?;

    if credentials_changed {
        state
            .registry
            .dispatch_lifecycle(PlatformLifecycleKind::Updated, &config)
            .await?;
    }
    match activity_change {
        Some(true) => {
            state
                .registry
                .dispatch_lifecycle(PlatformLifecycleKind::Activated, &config)
                .await?;
        }
        Some(false) => {
            state
                .registry
                .dispatch_lifecycle(PlatformLifecycleKind::Deactivated, &config)
                .await?;
        }
        None => {}
    }

    Ok(Json(config_view(&state, &config)))
}

/// `DELETE /api/v1/projects/:project/platforms/:platformId`
pub async fn delete_platform(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, platform_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let config = owned_config(&state, &project.id, &platform_id).await?;

    state
        .registry
        .dispatch_lifecycle(PlatformLifecycleKind::Deleted, &config)
        .await?;
    state.store.delete_platform(&config.id).await?;
    Ok(Json(json!({ "deleted": true })))
}

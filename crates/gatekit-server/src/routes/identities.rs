//! Identity routes

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use gatekit_core::{GatewayError, Identity, Pagination, Principal};
use gatekit_store::{IdentityResolver, IdentityStore, PlatformConfigStore};

use crate::auth::{resolve_project, ProjectAccess};
use crate::error::{ApiError, ApiResult};
use crate::routes::messages::PageQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasBody {
    pub platform_config_id: String,
    pub provider_user_id: String,
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdentityBody {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub aliases: Vec<AliasBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchIdentityBody {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

async fn owned_identity(
    state: &AppState,
    project_id: &str,
    identity_id: &str,
) -> ApiResult<Identity> {
    state
        .store
        .identity_by_id(identity_id)
        .await?
        .filter(|i| i.project_id == project_id)
        .ok_or_else(|| ApiError(GatewayError::NotFound("identity".into())))
}

async fn identity_view(state: &AppState, identity: &Identity) -> ApiResult<serde_json::Value> {
    let aliases = state.store.list_aliases(&identity.id).await?;
    let mut view = serde_json::to_value(identity).unwrap_or_default();
    view["aliases"] = serde_json::to_value(aliases).unwrap_or_default();
    Ok(view)
}

/// `GET /api/v1/projects/:project/identities`
pub async fn list_identities(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let page = Pagination::from_query(query.limit, query.offset)?;
    let identities = state.store.list_identities(&project.id, page).await?;

    let mut views = Vec::with_capacity(identities.len());
    for identity in &identities {
        views.push(identity_view(&state, identity).await?);
    }
    Ok(Json(json!({
        "identities": views,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// `POST /api/v1/projects/:project/identities`
pub async fn create_identity(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Json(body): Json<CreateIdentityBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;

    let now = Utc::now();
    let identity = state
        .store
        .insert_identity(Identity {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            display_name: body.display_name,
            email: body.email,
            metadata: body.metadata,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let resolver = IdentityResolver::new(state.store.clone());
    for alias in body.aliases {
        let platform = state
            .store
            .platform_by_id(&alias.platform_config_id)
            .await?
            .filter(|c| c.project_id == project.id)
            .ok_or_else(|| ApiError(GatewayError::NotFound("platform config".into())))?;
        resolver
            .add_alias(
                &identity.id,
                &project.id,
                &alias.platform_config_id,
                &platform.platform,
                &alias.provider_user_id,
                alias.display.as_deref(),
            )
            .await?;
    }

    Ok(Json(identity_view(&state, &identity).await?))
}

/// `GET /api/v1/projects/:project/identities/:identityId`
pub async fn get_identity(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, identity_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let identity = owned_identity(&state, &project.id, &identity_id).await?;
    Ok(Json(identity_view(&state, &identity).await?))
}

/// `PATCH /api/v1/projects/:project/identities/:identityId`
pub async fn patch_identity(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, identity_id)): Path<(String, String)>,
    Json(body): Json<PatchIdentityBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let mut identity = owned_identity(&state, &project.id, &identity_id).await?;

    if let Some(display_name) = body.display_name {
        identity.display_name = Some(display_name);
    }
    if let Some(email) = body.email {
        identity.email = Some(email);
    }
    if let Some(metadata) = body.metadata {
        identity.metadata = Some(metadata);
    }
    identity.updated_at = Utc::now();

    let identity = state.store.update_identity(identity).await?;
    Ok(Json(identity_view(&state, &identity).await?))
}

/// `DELETE /api/v1/projects/:project/identities/:identityId` — cascades
/// aliases
pub async fn delete_identity(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, identity_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let identity = owned_identity(&state, &project.id, &identity_id).await?;
    state.store.delete_identity(&identity.id).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// `POST /api/v1/projects/:project/identities/:identityId/aliases` — manual
/// link
pub async fn add_alias(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, identity_id)): Path<(String, String)>,
    Json(body): Json<AliasBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let identity = owned_identity(&state, &project.id, &identity_id).await?;

    let platform = state
        .store
        .platform_by_id(&body.platform_config_id)
        .await?
        .filter(|c| c.project_id == project.id)
        .ok_or_else(|| ApiError(GatewayError::NotFound("platform config".into())))?;

    let alias = IdentityResolver::new(state.store.clone())
        .add_alias(
            &identity.id,
            &project.id,
            &body.platform_config_id,
            &platform.platform,
            &body.provider_user_id,
            body.display.as_deref(),
        )
        .await?;
    Ok(Json(serde_json::to_value(alias).unwrap_or_default()))
}

/// `DELETE /api/v1/projects/:project/identities/:identityId/aliases/:aliasId`
/// Unlinks; the identity stays even when this was its last alias.
pub async fn remove_alias(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, identity_id, alias_id)): Path<(String, String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let identity = owned_identity(&state, &project.id, &identity_id).await?;

    let aliases = state.store.list_aliases(&identity.id).await?;
    if !aliases.iter().any(|a| a.id == alias_id) {
        return Err(ApiError(GatewayError::NotFound("alias".into())));
    }

    state.store.remove_alias(&alias_id).await?;
    Ok(Json(json!({ "removed": true })))
}

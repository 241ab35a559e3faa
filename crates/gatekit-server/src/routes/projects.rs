//! Project CRUD and membership

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use gatekit_core::{
    Environment, GatewayError, MemberRole, Principal, Project, ProjectMember,
};
use gatekit_store::ProjectStore;

use crate::auth::{resolve_project, ProjectAccess};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectBody {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProjectBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub is_default: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberBody {
    pub user_id: String,
    pub role: MemberRole,
}

fn project_view(project: &Project) -> serde_json::Value {
    json!({
        "id": project.id,
        "slug": project.slug,
        "name": project.name,
        "environment": project.environment,
        "ownerId": project.owner_id,
        "isDefault": project.is_default,
        "createdAt": project.created_at,
        "updatedAt": project.updated_at,
    })
}

/// Derive a URL-safe slug from a human name
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// `GET /api/v1/projects`
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<serde_json::Value>> {
    let projects = match &principal {
        // An API key sees exactly its own project
        Principal::ApiKey { project_id, .. } => state
            .store
            .project_by_id(project_id)
            .await?
            .into_iter()
            .collect::<Vec<_>>(),
        Principal::Jwt { user_id, .. } => {
            let mut owned = state.store.list_projects(Some(user_id)).await?;
            // Plus everything the user is a member of
            for project in state.store.list_projects(None).await? {
                if owned.iter().any(|p| p.id == project.id) {
                    continue;
                }
                if state.store.member(&project.id, user_id).await?.is_some() {
                    owned.push(project);
                }
            }
            owned
        }
    };

    Ok(Json(json!({
        "projects": projects.iter().map(project_view).collect::<Vec<_>>(),
    })))
}

/// `POST /api/v1/projects` — JWT principals only; API keys are bound to an
/// existing project and cannot mint new tenants.
pub async fn create_project(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateProjectBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let Principal::Jwt { user_id, .. } = &principal else {
        return Err(ApiError(GatewayError::InsufficientScope(
            "projects:write (user token required)".into(),
        )));
    };

    if body.name.trim().is_empty() {
        return Err(ApiError(GatewayError::validation("name", "must not be empty")));
    }
    let slug = match body.slug {
        Some(slug) => slug,
        None => slugify(&body.name),
    };
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ApiError(GatewayError::validation(
            "slug",
            "must be lowercase alphanumeric with dashes",
        )));
    }

    if body.is_default {
        clear_default(&state, user_id).await?;
    }

    let now = Utc::now();
    let project = state
        .store
        .insert_project(Project {
            id: Uuid::new_v4().to_string(),
            slug,
            name: body.name,
            environment: body.environment.unwrap_or_default(),
            owner_id: user_id.clone(),
            is_default: body.is_default,
            created_at: now,
            updated_at: now,
        })
        .await?;

    Ok(Json(project_view(&project)))
}

/// At most one default project per owner
async fn clear_default(state: &AppState, owner_id: &str) -> ApiResult<()> {
    for mut project in state.store.list_projects(Some(owner_id)).await? {
        if project.is_default {
            project.is_default = false;
            project.updated_at = Utc::now();
            state.store.update_project(project).await?;
        }
    }
    Ok(())
}

/// `GET /api/v1/projects/:project`
pub async fn get_project(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    Ok(Json(project_view(&project)))
}

/// `PATCH /api/v1/projects/:project`
pub async fn patch_project(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Json(body): Json<PatchProjectBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;

    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return Err(ApiError(GatewayError::validation("name", "must not be empty")));
        }
        project.name = name;
    }
    if let Some(environment) = body.environment {
        project.environment = environment;
    }
    if let Some(is_default) = body.is_default {
        if is_default && !project.is_default {
            clear_default(&state, &project.owner_id).await?;
        }
        project.is_default = is_default;
    }
    project.updated_at = Utc::now();

    let project = state.store.update_project(project).await?;
    Ok(Json(project_view(&project)))
}

/// `DELETE /api/v1/projects/:project`
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    state.store.delete_project(&project.id).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// `GET /api/v1/projects/:project/members`
pub async fn list_members(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let members = state.store.list_members(&project.id).await?;
    Ok(Json(json!({
        "ownerId": project.owner_id,
        "members": members,
    })))
}

/// `POST /api/v1/projects/:project/members`
pub async fn add_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Json(body): Json<AddMemberBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;

    // The owner is implicit and never stored as a member row
    if body.user_id == project.owner_id {
        return Err(ApiError(GatewayError::Conflict(
            "the project owner cannot be added as a member".into(),
        )));
    }
    if body.role == MemberRole::Owner {
        return Err(ApiError(GatewayError::validation(
            "role",
            "ownership is not grantable through membership",
        )));
    }

    let member = state
        .store
        .add_member(ProjectMember {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            user_id: body.user_id,
            role: body.role,
            added_at: Utc::now(),
        })
        .await?;
    Ok(Json(serde_json::to_value(member).unwrap_or_default()))
}

/// `DELETE /api/v1/projects/:project/members/:userId`
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, user_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;

    // The owner cannot be removed or demoted
    if user_id == project.owner_id {
        return Err(ApiError(GatewayError::Conflict(
            "the project owner cannot be removed".into(),
        )));
    }

    state.store.remove_member(&project.id, &user_id).await?;
    Ok(Json(json!({ "removed": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Demo Project"), "demo-project");
        assert_eq!(slugify("  My  App!  "), "my-app");
        assert_eq!(slugify("CamelCase99"), "camelcase99");
        assert_eq!(slugify("---"), "");
    }
}

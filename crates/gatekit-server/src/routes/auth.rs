//! Identity endpoints: whoami

use axum::extract::State;
use axum::{Extension, Json};

use gatekit_core::{Principal, WhoAmI, WhoAmIKey, WhoAmIProject, WhoAmIUser};
use gatekit_store::{ApiKeyStore, ProjectStore};

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /api/v1/auth/whoami` — who is calling, with what scopes
pub async fn whoami(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<WhoAmI>> {
    let permissions = principal.scopes().to_strings();

    let response = match &principal {
        Principal::ApiKey { project_id, key_id, key_name, .. } => {
            let project = state
                .store
                .project_by_id(project_id)
                .await?
                .map(|p| WhoAmIProject { id: p.id, slug: p.slug });
            let api_key = state
                .store
                .key_by_id(key_id)
                .await?
                .map(|key| WhoAmIKey {
                    id: key.id.clone(),
                    name: key_name.clone(),
                    masked_key: key.masked(),
                });
            WhoAmI {
                auth_type: principal.auth_type().to_string(),
                permissions,
                project,
                user: None,
                api_key,
            }
        }
        Principal::Jwt { user_id, email, .. } => WhoAmI {
            auth_type: principal.auth_type().to_string(),
            permissions,
            project: None,
            user: Some(WhoAmIUser {
                id: user_id.clone(),
                email: email.clone(),
            }),
            api_key: None,
        },
    };

    Ok(Json(response))
}

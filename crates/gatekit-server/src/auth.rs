//! Authentication, scope enforcement, and the project-access guard
//!
//! Both auth modes resolve to the same [`Principal`]. The middleware runs,
//! in order: route lookup, rate limit (in front of the principal), principal
//! extraction, scope check. The project guard is a second layer applied by
//! handlers on `{project}` routes; its failures read as not-found so
//! membership never leaks existence.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, warn};

use gatekit_core::{
    GatewayError, MemberRole, Principal, Project, Scope, ScopeSet,
};
use gatekit_crypto::hash_api_key;
use gatekit_store::{ApiKeyStore, ProjectStore};

use crate::error::{ApiError, ApiResult};
use crate::routes::table::route_spec;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Access level a handler needs on the project it resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAccess {
    Read,
    Write,
}

/// Route middleware: rate limit, authenticate, enforce declared scopes
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(matched) = request.extensions().get::<MatchedPath>().cloned() else {
        return next.run(request).await;
    };
    let Some(spec) = route_spec(request.method(), matched.as_str()) else {
        return next.run(request).await;
    };

    if spec.public {
        return next.run(request).await;
    }

    // Rate limiting runs in front of the principal, keyed by the raw
    // credential (or anonymous for unauthenticated probes).
    let caller_key = caller_key(&request);
    if let Err(e) = state.limiters.check(&spec.key(), &caller_key) {
        return ApiError(e).into_response();
    }

    let principal = match extract_principal(&state, &request).await {
        Ok(principal) => principal,
        Err(e) => return e.into_response(),
    };

    if !principal.scopes().contains_all(spec.required_scopes) {
        let missing = principal
            .scopes()
            .missing_from(spec.required_scopes)
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return ApiError(GatewayError::InsufficientScope(missing)).into_response();
    }

    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// Pre-auth caller key for rate limiting
fn caller_key(request: &Request) -> String {
    if let Some(key) = request.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return hash_api_key(key);
    }
    if let Some(bearer) = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return hash_api_key(bearer);
    }
    "anonymous".to_string()
}

/// Resolve the caller into a principal from either auth header
async fn extract_principal(state: &AppState, request: &Request) -> ApiResult<Principal> {
    if let Some(raw_key) = request.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return api_key_principal(state, raw_key).await;
    }

    if let Some(header) = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError(GatewayError::Authentication(
                "authorization header must be a bearer token".into(),
            ))
        })?;
        return jwt_principal(state, token);
    }

    Err(ApiError(GatewayError::Authentication(
        "missing credentials: provide X-API-Key or a bearer token".into(),
    )))
}

/// API-key path: hash, look up, check expiry/revocation, touch last-used
async fn api_key_principal(state: &AppState, raw_key: &str) -> ApiResult<Principal> {
    let hash = hash_api_key(raw_key);
    let key = state
        .store
        .key_by_hash(&hash)
        .await?
        .ok_or_else(|| ApiError(GatewayError::Authentication("invalid API key".into())))?;

    if !key.is_valid_at(Utc::now()) {
        return Err(ApiError(GatewayError::Authentication(
            "API key is expired or revoked".into(),
        )));
    }

    // Best-effort usage tracking; never blocks the request
    {
        let store = state.store.clone();
        let key_id = key.id.clone();
        tokio::spawn(async move {
            store.touch_key(&key_id, Utc::now()).await;
        });
    }

    let mut scopes = ScopeSet::new();
    for raw in &key.scopes {
        match raw.parse::<Scope>() {
            Ok(scope) => scopes.insert(scope),
            Err(_) => warn!(key = %key.id, scope = %raw, "stored key carries unknown scope"),
        }
    }

    Ok(Principal::ApiKey {
        project_id: key.project_id,
        key_id: key.id,
        key_name: key.name,
        scopes,
    })
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// JWT path: decode, then derive scopes as permissions ∪ split(scope)
fn jwt_principal(state: &AppState, token: &str) -> ApiResult<Principal> {
    let Some(jwt_config) = &state.config.jwt else {
        return Err(ApiError(GatewayError::Authentication(
            "bearer tokens are not enabled on this deployment".into(),
        )));
    };

    let mut validation = Validation::new(Algorithm::HS256);
    match &jwt_config.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let decoded = jsonwebtoken::decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(jwt_config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        debug!("jwt rejected: {e}");
        ApiError(GatewayError::Authentication("invalid bearer token".into()))
    })?;
    let claims = decoded.claims;

    let mut scopes = ScopeSet::new();
    let whitespace_scopes = claims.scope.as_deref().unwrap_or_default();
    for raw in claims.permissions.iter().map(String::as_str).chain(whitespace_scopes.split_whitespace()) {
        if let Ok(scope) = raw.parse::<Scope>() {
            scopes.insert(scope);
        }
    }

    Ok(Principal::Jwt {
        user_id: claims.sub,
        email: claims.email,
        scopes,
    })
}

/// Project-access guard, the second layer after scope checks.
///
/// API-key principals must be bound to the resolved project; JWT principals
/// must own it or hold a membership (admin or better for writes). Any
/// failure is a 404.
pub async fn resolve_project(
    state: &AppState,
    principal: &Principal,
    project_ref: &str,
    access: ProjectAccess,
) -> ApiResult<Project> {
    let project = match state.store.project_by_slug(project_ref).await? {
        Some(project) => project,
        None => state
            .store
            .project_by_id(project_ref)
            .await?
            .ok_or_else(|| ApiError(GatewayError::NotFound("project".into())))?,
    };

    match principal {
        Principal::ApiKey { project_id, .. } => {
            if *project_id != project.id {
                return Err(ApiError(GatewayError::NotFound("project".into())));
            }
        }
        Principal::Jwt { user_id, .. } => {
            if project.owner_id != *user_id {
                let member = state.store.member(&project.id, user_id).await?;
                let allowed = match (member, access) {
                    (Some(_), ProjectAccess::Read) => true,
                    (Some(member), ProjectAccess::Write) => member.role.at_least(MemberRole::Admin),
                    (None, _) => false,
                };
                if !allowed {
                    return Err(ApiError(GatewayError::NotFound("project".into())));
                }
            }
        }
    }

    Ok(project)
}

#[allow(dead_code)]
fn _assert_mw_is_send() {
    fn is_send<T: Send>(_: T) {}
    fn mk() -> (State<AppState>, Request, Next) { todo!() }
    let (s, r, n) = mk();
    is_send(auth_middleware(s, r, n));
}

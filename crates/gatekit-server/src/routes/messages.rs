//! Message routes: send, job status, retry, history, stats, cleanup

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use gatekit_core::{GatewayError, Pagination, Principal};
use gatekit_pipeline::{JobStatus, SendRequest};
use gatekit_store::{MessageStore, ReactionStore, ReceivedMessageFilter};

use crate::auth::{resolve_project, ProjectAccess};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedQuery {
    #[serde(default)]
    pub platform_config_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub reactions: Option<bool>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    pub before: DateTime<Utc>,
}

/// `POST /api/v1/projects/:project/messages/send`
pub async fn send_message(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Json(request): Json<SendRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let response = state.outbound.submit(&project, request).await?;
    Ok(Json(serde_json::to_value(&response).unwrap_or_default()))
}

/// Job lookup that refuses to leak other tenants' jobs
fn owned_job(state: &AppState, project_id: &str, job_id: &str) -> ApiResult<JobStatus> {
    state
        .outbound
        .job_status(job_id)
        .filter(|job| job.data.project_id == project_id)
        .ok_or_else(|| ApiError(GatewayError::NotFound("job".into())))
}

/// `GET /api/v1/projects/:project/messages/status/:jobId`
pub async fn message_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, job_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let job = owned_job(&state, &project.id, &job_id)?;
    Ok(Json(serde_json::to_value(&job).unwrap_or_default()))
}

/// `POST /api/v1/projects/:project/messages/retry/:jobId`
pub async fn retry_message(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_ref, job_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    owned_job(&state, &project.id, &job_id)?;
    let response = state.outbound.retry(&job_id).await?;
    Ok(Json(serde_json::to_value(&response).unwrap_or_default()))
}

/// `GET /api/v1/projects/:project/messages` — received history
pub async fn list_received(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Query(query): Query<ReceivedQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let page = Pagination::from_query(query.limit, query.offset)?;
    let filter = ReceivedMessageFilter {
        platform_config_id: query.platform_config_id,
        provider_chat_id: query.chat_id,
        provider_user_id: query.user_id,
    };

    let messages = state.store.list_received(&project.id, &filter, page).await?;

    let include_reactions = query.reactions.unwrap_or(false);
    let mut views = Vec::with_capacity(messages.len());
    for message in &messages {
        let mut view = serde_json::to_value(message).unwrap_or_default();
        if include_reactions {
            let groups = state
                .store
                .current_reactions(&message.platform_config_id, &message.provider_message_id)
                .await?;
            view["reactions"] = serde_json::to_value(groups).unwrap_or_default();
        }
        views.push(view);
    }

    Ok(Json(json!({
        "messages": views,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// `GET /api/v1/projects/:project/messages/sent`
pub async fn list_sent(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let page = Pagination::from_query(query.limit, query.offset)?;
    let messages = state.store.list_sent(&project.id, page).await?;
    Ok(Json(json!({
        "messages": messages,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// `GET /api/v1/projects/:project/messages/stats`
pub async fn message_stats(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let stats = state.store.message_stats(&project.id).await?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}

/// `DELETE /api/v1/projects/:project/messages?before=` — explicit cleanup
pub async fn cleanup_messages(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Query(query): Query<CleanupQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let project =
        resolve_project(&state, &principal, &project_ref, ProjectAccess::Write).await?;
    let deleted = state
        .store
        .delete_received_before(&project.id, query.before)
        .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

//! Platform-log routes

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use gatekit_core::{LogCategory, LogLevel, Pagination, Principal, MAX_LOG_PAGE_LIMIT};
use gatekit_store::{LogFilter, PlatformLogStore};

use crate::auth::{resolve_project, ProjectAccess};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub platform_config_id: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LogStatsQuery {
    #[serde(default)]
    pub recent: Option<usize>,
}

/// `GET /api/v1/projects/:project/logs`
pub async fn list_logs(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;

    let level = query
        .level
        .as_deref()
        .map(str::parse::<LogLevel>)
        .transpose()
        .map_err(ApiError)?;
    let category = query
        .category
        .as_deref()
        .map(str::parse::<LogCategory>)
        .transpose()
        .map_err(ApiError)?;
    let page = Pagination::from_query_capped(query.limit, query.offset, MAX_LOG_PAGE_LIMIT)?;

    let logs = state
        .store
        .query_logs(
            &project.id,
            &LogFilter {
                platform: query.platform,
                platform_config_id: query.platform_config_id,
                level,
                category,
                start: query.start_date,
                end: query.end_date,
            },
            page,
        )
        .await?;
    Ok(Json(json!({
        "logs": logs,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// `GET /api/v1/projects/:project/logs/stats`
pub async fn log_stats(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_ref): Path<String>,
    Query(query): Query<LogStatsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let project = resolve_project(&state, &principal, &project_ref, ProjectAccess::Read).await?;
    let stats = state
        .store
        .log_stats(&project.id, query.recent.unwrap_or(10).min(100))
        .await?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}

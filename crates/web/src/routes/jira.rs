//! Jira passthrough

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::jira::{IssueQuery, JiraClient};
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/jira/projects", get(projects_handler))
        .route("/api/jira/issues", get(issues_handler))
}

fn client(state: &AppState) -> ApiResult<&JiraClient> {
    state
        .jira
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Jira is not configured".to_string()))
}

async fn projects_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let projects = client(&state)?
        .get_projects()
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch Jira projects", e))?;
    Ok(Json(json!({
        "success": true,
        "total": projects.len(),
        "projects": projects,
    })))
}

async fn issues_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IssueQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let page = client(&state)?
        .get_issues(&query)
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch Jira issues", e))?;
    Ok(Json(json!({
        "success": true,
        "total": page.total,
        "issues": page.issues,
    })))
}

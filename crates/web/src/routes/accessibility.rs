//! axe audits

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use testdeck_runner::playwright::Viewport;
use testdeck_runner::AccessibilityRequest;

use crate::error::ApiResult;
use crate::routes::{cancellable, required};
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/accessibility/run", post(run_handler))
        .route("/api/accessibility/results", get(list_results_handler))
        .route("/api/accessibility/results/:file", get(get_result_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunBody {
    screen_name: Option<String>,
    url: Option<String>,
    viewport: Option<Viewport>,
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let request = AccessibilityRequest {
        screen_name: required(body.screen_name, "screenName")?,
        url: required(body.url, "url")?,
        viewport: body.viewport,
    };

    let report = cancellable(|cancel| async move { state.accessibility.run(request, cancel).await }).await?;
    Ok(Json(json!({
        "success": true,
        "screenName": report.screen_name,
        "violationCount": report.violation_count,
        "results": report.results,
        "resultFile": report.result_file,
    })))
}

async fn list_results_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let results = state.accessibility.results();
    Json(json!({
        "success": true,
        "total": results.len(),
        "results": results,
    }))
}

async fn get_result_handler(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = state.accessibility.read_result(&file)?;
    Ok(Json(json!({ "success": true, "result": result })))
}

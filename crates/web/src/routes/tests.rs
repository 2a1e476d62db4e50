//! Test discovery, runs and stored run logs

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use testdeck_common::{group_by_category, TestDescriptor, TestScanner, TestType};
use testdeck_runner::RunRequest;

use crate::error::{ApiError, ApiResult};
use crate::routes::{cancellable, required, run_response};
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tests", get(list_tests_handler))
        .route("/api/tests/run", post(run_test_handler))
        .route("/api/tests/results", get(list_results_handler))
        .route("/api/tests/results/:id", get(get_result_handler))
}

#[derive(Debug, Default, Deserialize)]
struct TestFilter {
    #[serde(rename = "type")]
    test_type: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunTestBody {
    test_path: Option<String>,
    env: Option<String>,
    base_url: Option<String>,
}

/// Walk a test root off the async runtime
pub(crate) async fn scan_dir(root: PathBuf, scanner: TestScanner) -> ApiResult<Vec<TestDescriptor>> {
    tokio::task::spawn_blocking(move || scanner.scan(&root))
        .await
        .map_err(|e| ApiError::internal("Scan failed", e))
}

async fn list_tests_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TestFilter>,
) -> ApiResult<Json<serde_json::Value>> {
    let wanted_type = match filter.test_type.as_deref().filter(|t| !t.is_empty()) {
        Some(name) => Some(
            TestType::from_name(name)
                .ok_or_else(|| ApiError::bad_request(format!("Unknown test type: {}", name)))?,
        ),
        None => None,
    };

    let mut tests = scan_dir(state.config.paths.tests_dir.clone(), state.scanner.clone()).await?;
    tests.retain(|t| {
        wanted_type.map(|w| t.test_type == w).unwrap_or(true)
            && filter
                .category
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(|c| t.category == c)
                .unwrap_or(true)
    });

    let by_category = group_by_category(&tests);
    let categories: Vec<&String> = by_category.keys().collect();
    Ok(Json(json!({
        "success": true,
        "totalTests": tests.len(),
        "categories": categories,
        "testsByCategory": by_category,
        "tests": tests,
    })))
}

async fn run_test_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunTestBody>,
) -> ApiResult<Response> {
    let test_path = required(body.test_path, "testPath")?;
    let mut request = RunRequest::new(test_path);
    request.env = body.env.filter(|e| !e.trim().is_empty());
    request.base_url = body.base_url.filter(|u| !u.trim().is_empty());

    let result = cancellable(|cancel| async move {
        state.orchestrator.run(request, None, cancel).await
    })
    .await?;
    Ok(run_response(&result))
}

async fn list_results_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let runs = state
        .orchestrator
        .run_logs()
        .map(|logs| logs.list())
        .unwrap_or_default();
    Json(json!({
        "success": true,
        "total": runs.len(),
        "runs": runs,
    }))
}

async fn get_result_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let logs = state
        .orchestrator
        .run_logs()
        .ok_or_else(|| ApiError::not_found("Run logs are disabled"))?;
    let run = logs.read(&id).map_err(|e| match e {
        testdeck_runner::RunnerError::TestNotFound { .. } => {
            ApiError::not_found(format!("Run not found: {}", id))
        }
        other => other.into(),
    })?;
    Ok(Json(json!({ "success": true, "run": run })))
}

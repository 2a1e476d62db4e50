//! Performance suite listing and runs

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use testdeck_common::TestScanner;
use testdeck_runner::RunRequest;

use crate::error::{ApiError, ApiResult};
use crate::routes::tests::scan_dir;
use crate::routes::{cancellable, required, run_response};
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/performance/tests", get(list_handler))
        .route("/performance/run-test", post(run_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunBody {
    test_id: Option<String>,
    env: Option<String>,
}

fn scanner(state: &AppState) -> TestScanner {
    state.scanner.clone().also_match(".k6.js")
}

async fn list_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let tests = scan_dir(state.config.paths.performance_dir.clone(), scanner(&state)).await?;
    Ok(Json(json!({
        "success": true,
        "totalTests": tests.len(),
        "tests": tests,
    })))
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunBody>,
) -> ApiResult<Response> {
    let test_id = required(body.test_id, "testId")?;
    let root = state.config.paths.performance_dir.clone();

    let tests = scan_dir(root.clone(), scanner(&state)).await?;
    let test = tests
        .into_iter()
        .find(|t| t.id == test_id || t.path == test_id)
        .ok_or_else(|| ApiError::not_found(format!("Performance test not found: {}", test_id)))?;

    let file = root.join(&test.path);
    let mut request = RunRequest::new(test.path);
    request.env = body.env.filter(|e| !e.trim().is_empty());

    let result = cancellable(|cancel| async move {
        state.orchestrator.run_file(request, &file, None, cancel).await
    })
    .await?;
    Ok(run_response(&result))
}

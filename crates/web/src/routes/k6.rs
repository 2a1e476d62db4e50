//! k6 scripts addressed by name

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use testdeck_runner::{RunRequest, RunnerKind};

use crate::error::ApiResult;
use crate::routes::{cancellable, required, run_response};
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/k6-tests", get(list_handler))
        .route("/api/k6-tests/run", post(run_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunBody {
    test_name: Option<String>,
    env: Option<String>,
}

async fn list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let scripts = state.k6.list();
    Json(json!({
        "success": true,
        "total": scripts.len(),
        "tests": scripts,
    }))
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunBody>,
) -> ApiResult<Response> {
    let name = required(body.test_name, "testName")?;
    let file = state.k6.locate(&name)?;

    let mut request = RunRequest::new(name).kind(RunnerKind::K6);
    request.env = body.env.filter(|e| !e.trim().is_empty());

    let result = cancellable(|cancel| async move {
        state.orchestrator.run_file(request, &file, None, cancel).await
    })
    .await?;
    Ok(run_response(&result))
}

//! Keyboard interaction checks

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use testdeck_runner::keyboard::catalogue;

use crate::error::ApiResult;
use crate::routes::{cancellable, required};
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/keyboard-tests", get(list_handler))
        .route("/api/keyboard-tests/run", post(run_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunBody {
    test_id: Option<String>,
    url: Option<String>,
}

async fn list_handler() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "tests": catalogue(),
    }))
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let test_id = required(body.test_id, "testId")?;
    let url = required(body.url, "url")?;

    let report = cancellable(|cancel| async move {
        state.keyboard.run(&test_id, &url, cancel).await
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "result": report,
    })))
}

//! Screenshot capture, comparison and baselines

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use testdeck_runner::playwright::Viewport;
use testdeck_runner::CaptureRequest;

use crate::error::ApiResult;
use crate::routes::{cancellable, required};
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/visual-tests/capture", post(capture_handler))
        .route("/api/visual-tests/compare", post(compare_handler))
        .route("/api/visual-tests/update-baseline", post(update_baseline_handler))
        .route("/api/visual-tests/baselines", get(list_baselines_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureBody {
    test_name: Option<String>,
    url: Option<String>,
    viewport: Option<Viewport>,
    selector: Option<String>,
    full_page: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameBody {
    test_name: Option<String>,
    threshold: Option<f64>,
}

async fn capture_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CaptureBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let request = CaptureRequest {
        test_name: required(body.test_name, "testName")?,
        url: required(body.url, "url")?,
        viewport: body.viewport,
        selector: body.selector.filter(|s| !s.trim().is_empty()),
        full_page: body.full_page.unwrap_or(true),
    };

    let capture = cancellable(|cancel| async move { state.visual.capture(request, cancel).await }).await?;
    Ok(Json(json!({ "success": true, "capture": capture })))
}

async fn compare_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NameBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = required(body.test_name, "testName")?;
    let visual = state.visual.clone();
    let diff = tokio::task::spawn_blocking(move || visual.compare(&name, body.threshold))
        .await
        .map_err(|e| crate::error::ApiError::internal("Comparison failed", e))??;

    Ok(Json(json!({
        "success": true,
        "match": diff.matches,
        "diff": diff,
    })))
}

async fn update_baseline_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NameBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = required(body.test_name, "testName")?;
    let baseline = state.visual.update_baseline(&name)?;
    Ok(Json(json!({ "success": true, "baseline": baseline })))
}

async fn list_baselines_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let baselines = state.visual.list_baselines()?;
    Ok(Json(json!({
        "success": true,
        "total": baselines.len(),
        "baselines": baselines,
    })))
}

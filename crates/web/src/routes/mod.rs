//! HTTP handlers grouped by feature
//!
//! Each module exposes `routes()`, merged into the main router by
//! [`crate::server::WebServer::router`].

use std::future::Future;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use testdeck_common::RunResult;
use testdeck_runner::RunnerResult;

use crate::error::{ApiError, ApiResult};

pub mod accessibility;
pub mod behavior;
pub mod flows;
pub mod jira;
pub mod k6;
pub mod keyboard;
pub mod performance;
pub mod tests;
pub mod visual;

/// Run a job on its own task, tied to the request.
///
/// Dropping the returned future (the client went away) cancels the job's
/// token; the job itself keeps running until it has observed the
/// cancellation and cleaned up.
pub(crate) async fn cancellable<T, F, Fut>(job: F) -> ApiResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = RunnerResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let joined = tokio::spawn(job(cancel)).await;
    guard.disarm();
    Ok(joined.map_err(|e| ApiError::internal("Run task failed", e))??)
}

/// Shape a finished run into the response envelope.
///
/// A failed run is a 500 carrying the raw output next to the error.
pub(crate) fn run_response(result: &RunResult) -> Response {
    let error_output = (!result.error_output.is_empty()).then(|| result.error_output.clone());
    let mut body = json!({
        "success": result.success,
        "testPath": result.test_path,
        "status": result.status(),
        "results": result.parsed_results,
        "output": result.output,
        "error": error_output,
        "exitCode": result.exit_code,
        "aborted": result.aborted,
        "durationMs": result.duration_ms,
        "runId": result.run_id,
    });

    if result.success {
        return (StatusCode::OK, Json(body)).into_response();
    }

    body["error"] = json!(if result.aborted {
        "Test run aborted by client".to_string()
    } else {
        format!("Test run failed with exit code {}", result.exit_code)
    });
    body["details"] = json!(error_output);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Reject a missing or blank required string field
pub(crate) fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{} is required", field)))
}

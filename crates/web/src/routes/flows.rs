//! Flow document CRUD

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/flows", get(list_handler).post(create_handler))
        .route(
            "/flows/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
}

fn object(body: Value) -> ApiResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::bad_request("Flow must be a JSON object")),
    }
}

fn missing(id: &str) -> ApiError {
    ApiError::not_found(format!("Flow not found: {}", id))
}

async fn list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let flows = state.flows.list();
    Json(json!({
        "success": true,
        "total": flows.len(),
        "flows": flows,
    }))
}

async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let flow = state.flows.create(object(body)?);
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "flow": flow }))))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let flow = state.flows.get(&id).ok_or_else(|| missing(&id))?;
    Ok(Json(json!({ "success": true, "flow": flow })))
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let flow = state
        .flows
        .replace(&id, object(body)?)
        .ok_or_else(|| missing(&id))?;
    Ok(Json(json!({ "success": true, "flow": flow })))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.flows.delete(&id).ok_or_else(|| missing(&id))?;
    Ok(Json(json!({ "success": true, "id": id })))
}

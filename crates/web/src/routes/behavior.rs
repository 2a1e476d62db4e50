//! Client behavior tracking

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use testdeck_common::{BehaviorEvent, BehaviorSession};

use crate::error::{ApiError, ApiResult};
use crate::routes::required;
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/behavior/track", post(track_handler))
        .route("/api/behavior/sessions", get(list_sessions_handler))
        .route("/api/behavior/sessions/:id", get(get_session_handler))
        .route("/api/behavior/summary", get(summary_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackBody {
    session_id: Option<String>,
    #[serde(default)]
    events: Vec<BehaviorEvent>,
    /// Sent on page unload
    #[serde(default)]
    ended: bool,
}

async fn track_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TrackBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = required(body.session_id, "sessionId")?;
    let received = body.events.len();
    let ended = body.ended;

    let session = state.sessions.upsert(
        &session_id,
        || BehaviorSession::new(session_id.clone()),
        |session| {
            session.record(body.events);
            if ended {
                session.end();
            }
        },
    );

    Ok(Json(json!({
        "success": true,
        "sessionId": session.session_id,
        "received": received,
        "eventCount": session.events.len(),
        "active": session.is_active(),
    })))
}

async fn list_sessions_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut sessions = state.sessions.values();
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    let sessions: Vec<_> = sessions
        .iter()
        .map(|s| {
            json!({
                "sessionId": s.session_id,
                "startedAt": s.started_at,
                "lastEventAt": s.last_event_at,
                "endedAt": s.ended_at,
                "eventCount": s.events.len(),
                "active": s.is_active(),
            })
        })
        .collect();
    Json(json!({
        "success": true,
        "total": sessions.len(),
        "sessions": sessions,
    }))
}

async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("Session not found: {}", id)))?;
    Ok(Json(json!({ "success": true, "session": session })))
}

async fn summary_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.sessions.values();
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for event in sessions.iter().flat_map(|s| &s.events) {
        *by_type.entry(event.event_type.clone()).or_default() += 1;
    }
    Json(json!({
        "success": true,
        "totalSessions": sessions.len(),
        "activeSessions": sessions.iter().filter(|s| s.is_active()).count(),
        "totalEvents": by_type.values().sum::<usize>(),
        "eventsByType": by_type,
    }))
}

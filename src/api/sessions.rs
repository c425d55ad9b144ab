/// Session lifecycle REST API endpoints
///
/// The transport layer (Telegram bridge, sandbox simulator) drives
/// conversations through these routes: start a session on a funnel, feed
/// user messages into suspended sessions, inspect state and transcript.
/// Every response carries the ordered effect list of the tick, ready for
/// delivery.

use crate::api::funnels::AppState;
use crate::error::SessionError;
use crate::runtime::engine::SessionStatus;
use crate::runtime::executor::Effect;
use crate::runtime::vars::VarValue;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Request body for session creation
#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Initial variable scope (e.g. profile fields known up front)
    #[serde(default)]
    pub variables: HashMap<String, VarValue>,
}

/// Request body for resuming a suspended session
#[derive(Debug, Deserialize)]
pub struct SessionInputRequest {
    /// The user's raw answer
    pub value: String,
}

/// Response for session ticks
#[derive(Debug, Serialize)]
pub struct TickResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    /// Ordered effects for the transport layer to deliver
    pub effects: Vec<Effect>,
}

/// Create session lifecycle routes
pub fn create_session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/funnels/{id}/sessions", post(start_session))
        .route("/api/sessions/{id}/input", post(session_input))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}", delete(delete_session))
        .route("/api/sessions/{id}/transcript", get(get_transcript))
}

/// Start a session on a funnel and run until it suspends or finishes
///
/// POST /api/funnels/{id}/sessions
/// Body: { "variables": { "name": "Ana" } }
async fn start_session(
    State(state): State<AppState>,
    Path(funnel_id): Path<String>,
    payload: Option<Json<StartSessionRequest>>,
) -> Result<Json<TickResponse>, (StatusCode, Json<Value>)> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();

    let (session_id, effects) = state
        .sessions
        .start_session(&funnel_id, request.variables)
        .await
        .map_err(session_error)?;

    let status = current_status(&state, session_id).await;
    Ok(Json(TickResponse {
        session_id,
        status,
        effects,
    }))
}

/// Feed a user message into a suspended session
///
/// POST /api/sessions/{id}/input
/// Body: { "value": "Ana" }
async fn session_input(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SessionInputRequest>,
) -> Result<Json<TickResponse>, (StatusCode, Json<Value>)> {
    let effects = state
        .sessions
        .resume_session(session_id, payload.value)
        .await
        .map_err(session_error)?;

    let status = current_status(&state, session_id).await;
    Ok(Json(TickResponse {
        session_id,
        status,
        effects,
    }))
}

/// Inspect a session's persisted state shape
///
/// GET /api/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let snapshot = state
        .sessions
        .session_state(session_id)
        .await
        .map_err(session_error)?;

    Ok(Json(json!({
        "session_id": snapshot.session_id,
        "funnel_id": snapshot.funnel_id,
        "current_node_id": snapshot.current_node_id,
        "status": snapshot.status,
        "variables": snapshot.variables,
        "step_count": snapshot.step_count,
        "waiting": snapshot.waiting,
        "wake_at": snapshot.wake_at,
    })))
}

/// Archive a session, cancelling any pending delay timer
///
/// DELETE /api/sessions/{id}
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.sessions.delete_session(session_id).await {
        Ok(true) => Ok(Json(json!({ "message": "Session deleted successfully" }))),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "session not found" })),
        )),
        Err(e) => Err(session_error(e)),
    }
}

/// Dump a session's transcript (observability only)
///
/// GET /api/sessions/{id}/transcript
async fn get_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let entries = state
        .sessions
        .session_transcript(session_id)
        .await
        .map_err(session_error)?;

    Ok(Json(json!({ "entries": entries })))
}

async fn current_status(state: &AppState, session_id: Uuid) -> SessionStatus {
    state
        .sessions
        .session_state(session_id)
        .await
        .map(|s| s.status)
        .unwrap_or(SessionStatus::Finished)
}

/// Map engine caller errors onto HTTP status codes
fn session_error(e: SessionError) -> (StatusCode, Json<Value>) {
    let status = match e {
        SessionError::NotFound(_) | SessionError::FunnelNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::AlreadyFinished
        | SessionError::InputRequired
        | SessionError::NotWaitingForInput
        | SessionError::NotWaitingForTimer => StatusCode::CONFLICT,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

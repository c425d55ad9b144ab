/// Funnel management REST API endpoints
///
/// CRUD for funnel definitions with hot-reload: every change is validated
/// by compiling the graph, persisted, and swapped into the registry so
/// new sessions pick it up immediately. Compile warnings (duplicate
/// handles, half-configured nodes) are returned to the author alongside
/// success.

use crate::funnel::{registry::FunnelRegistry, storage::FunnelStorage, types::FunnelDefinition};
use crate::runtime::session::SessionManager;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Funnel definition persistence
    pub storage: FunnelStorage,
    /// Hot-reload registry of compiled funnels
    pub registry: Arc<FunnelRegistry>,
    /// Session manager (shared with the session routes)
    pub sessions: Arc<SessionManager>,
}

/// Response for funnel creation/update operations
#[derive(Debug, Serialize)]
pub struct FunnelResponse {
    pub id: String,
    pub message: String,
    /// Non-fatal authoring problems found while compiling
    pub warnings: Vec<String>,
}

/// Request body for funnel creation/update
#[derive(Debug, Deserialize)]
pub struct SaveFunnelRequest {
    pub funnel: FunnelDefinition,
}

/// Create funnel management routes
pub fn create_funnel_routes() -> Router<AppState> {
    Router::new()
        .route("/api/funnels", post(create_funnel))
        .route("/api/funnels", get(list_funnels))
        .route("/api/funnels/{id}", get(get_funnel))
        .route("/api/funnels/{id}", put(update_funnel))
        .route("/api/funnels/{id}", delete(delete_funnel))
}

/// Create a new funnel
///
/// POST /api/funnels
/// Body: { "funnel": { "id", "name", "schemaVersion", "nodes": [...], "edges": [...] } }
async fn create_funnel(
    State(state): State<AppState>,
    Json(payload): Json<SaveFunnelRequest>,
) -> Result<Json<FunnelResponse>, (StatusCode, Json<Value>)> {
    let funnel = payload.funnel;

    if funnel.id.is_empty() || funnel.name.is_empty() {
        return Err(bad_request("funnel id and name are required"));
    }

    // Structural validation before anything touches storage
    let warnings = FunnelRegistry::validate(funnel.clone())
        .map_err(|e| bad_request(&e.to_string()))?;

    match state.storage.get_funnel(&funnel.id).await {
        Ok(Some(_)) => {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("funnel '{}' already exists", funnel.id) })),
            ))
        }
        Ok(None) => {}
        Err(e) => return Err(internal(&e.to_string())),
    }

    if let Err(e) = state.storage.save_funnel(&funnel).await {
        tracing::error!("Failed to save funnel: {}", e);
        return Err(internal("failed to save funnel"));
    }
    if let Err(e) = state.registry.reload_funnel(&funnel.id).await {
        tracing::error!("Failed to reload funnel into registry: {}", e);
        return Err(internal("failed to reload funnel"));
    }

    tracing::info!("🔥 Created funnel: {} ({})", funnel.id, funnel.name);
    Ok(Json(FunnelResponse {
        id: funnel.id.clone(),
        message: format!("Funnel '{}' created successfully", funnel.name),
        warnings,
    }))
}

/// List all funnels
///
/// GET /api/funnels
async fn list_funnels(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.storage.list_funnels().await {
        Ok(funnels) => Ok(Json(json!({ "funnels": funnels }))),
        Err(e) => {
            tracing::error!("Failed to list funnels: {}", e);
            Err(internal("failed to list funnels"))
        }
    }
}

/// Get a specific funnel definition
///
/// GET /api/funnels/{id}
async fn get_funnel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FunnelDefinition>, StatusCode> {
    match state.storage.get_funnel(&id).await {
        Ok(Some(funnel)) => Ok(Json(funnel)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get funnel {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Update an existing funnel
///
/// PUT /api/funnels/{id}
async fn update_funnel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SaveFunnelRequest>,
) -> Result<Json<FunnelResponse>, (StatusCode, Json<Value>)> {
    let mut funnel = payload.funnel;
    // The URL parameter is authoritative for the ID
    funnel.id = id.clone();

    if funnel.name.is_empty() {
        return Err(bad_request("funnel name is required"));
    }

    let warnings = FunnelRegistry::validate(funnel.clone())
        .map_err(|e| bad_request(&e.to_string()))?;

    match state.storage.get_funnel(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("funnel '{}' not found", id) })),
            ))
        }
        Err(e) => return Err(internal(&e.to_string())),
    }

    if let Err(e) = state.storage.save_funnel(&funnel).await {
        tracing::error!("Failed to update funnel: {}", e);
        return Err(internal("failed to update funnel"));
    }
    if let Err(e) = state.registry.reload_funnel(&funnel.id).await {
        tracing::error!("Failed to reload updated funnel: {}", e);
        return Err(internal("failed to reload funnel"));
    }

    tracing::info!("🔥 Hot-reloaded funnel: {} ({})", funnel.id, funnel.name);
    Ok(Json(FunnelResponse {
        id: funnel.id,
        message: format!("Funnel '{}' updated successfully", funnel.name),
        warnings,
    }))
}

/// Delete a funnel
///
/// DELETE /api/funnels/{id}
///
/// Sessions already running on the funnel keep their compiled graph and
/// finish normally; new sessions can no longer start.
async fn delete_funnel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.registry.remove_funnel(&id);

    match state.storage.delete_funnel(&id).await {
        Ok(true) => {
            tracing::info!("Deleted funnel: {}", id);
            Ok(Json(json!({ "message": "Funnel deleted successfully" })))
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete funnel: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

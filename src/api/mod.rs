/// HTTP API layer
///
/// REST endpoints for funnel management and session execution:
/// - Funnel CRUD with save-time validation and hot-reload
/// - Session lifecycle: start, input, inspect, transcript, delete

// Funnel management endpoints (POST/GET/PUT/DELETE)
pub mod funnels;

// Session lifecycle endpoints
pub mod sessions;

pub use funnels::{create_funnel_routes, AppState};
pub use sessions::create_session_routes;

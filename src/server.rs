/// Server setup and initialization
///
/// Wires together all components: storage, registry, session manager, and
/// HTTP routes. Provides the application factory and the serve entry
/// point.

use crate::{
    api::{funnels::create_funnel_routes, sessions::create_session_routes, AppState},
    config::Config,
    funnel::{registry::FunnelRegistry, storage::FunnelStorage},
    runtime::{dispatch::EffectDispatcher, session::SessionManager, store::SessionStore},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;

/// Create the main Axum application with all routes
///
/// Initializes the database, loads funnels into the registry, restores
/// unfinished sessions (rescheduling their delay timers), and wires the
/// HTTP routes.
pub async fn create_app(config: Config) -> Result<Router> {
    // Ensure the database directory exists
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;
        }
    }

    tracing::info!("🗄️ Opening database: {}", config.database.path);
    let options = SqliteConnectOptions::new()
        .filename(&config.database.path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    tracing::info!("📋 Initializing storage schemas");
    let funnel_storage = FunnelStorage::new(pool.clone());
    funnel_storage.init_schema().await?;
    let session_store = SessionStore::new(pool);
    session_store.init_schema().await?;

    tracing::info!("📊 Initializing funnel registry");
    let registry = Arc::new(FunnelRegistry::new(funnel_storage.clone()));
    registry.init_from_storage().await?;

    tracing::info!("⚙️ Initializing session manager");
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&registry),
        session_store,
        EffectDispatcher::new(),
    ));

    tracing::info!("📥 Restoring unfinished sessions");
    sessions.restore_from_storage().await?;

    let app_state = AppState {
        storage: funnel_storage,
        registry,
        sessions,
    };

    tracing::info!("📡 Creating HTTP router");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_funnel_routes().with_state(app_state.clone()))
        .merge(create_session_routes().with_state(app_state));

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Funnelflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}

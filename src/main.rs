/// Funnelflow: conversational funnel execution engine
///
/// Main entry point. Initializes configuration and starts the HTTP server
/// with funnel management and session execution capabilities.

use funnelflow::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Funnel management API at /api/funnels/*
/// - Session execution API at /api/funnels/{id}/sessions and /api/sessions/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults plus FUNNELFLOW_* env overrides)
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}

mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::CrmAssistant;
use crate::engine::LeadWorkflow;
use crate::storage::RecordStore;

pub use errors::{AppError, ErrorResponse};

/// Shared application state accessible by all handlers.
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub workflow: Arc<LeadWorkflow>,
    pub assistant: Arc<CrmAssistant>,
    /// Wall-clock budget for one workflow trigger.
    pub workflow_timeout: Duration,
}

/// Build the API router.
pub fn router(state: Arc<AppState>, max_body: usize) -> Router {
    Router::new()
        .route("/api/workflows/lead-processing", post(handlers::run_lead_workflow))
        .route("/api/leads", get(handlers::list_leads).post(handlers::create_lead))
        .route("/api/leads/{id}", get(handlers::get_lead))
        .route("/api/agent", post(handlers::chat))
        .route("/api/agent/tools", get(handlers::list_tools))
        .route("/api/agent/tools/{name}", post(handlers::call_tool))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the REST API server.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16, max_body: usize) -> Result<()> {
    let app = router(state, max_body);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Leadflow API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

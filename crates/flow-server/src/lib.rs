pub mod error;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use flow_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Upload ceiling for PRD documents.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::status::health))
        // Agent catalog
        .route("/api/agents", get(routes::agents::list_agents))
        .route("/api/agents/create", post(routes::agents::create_agent))
        .route("/api/agents/status", get(routes::status::pipeline_status))
        .route(
            "/api/agents/{id}",
            get(routes::agents::get_agent).delete(routes::agents::delete_agent),
        )
        .route("/api/agents/chat", post(routes::agents::chat))
        // Workflow
        .route(
            "/api/agents/orchestrate-sdlc",
            post(routes::orchestrate::orchestrate_sdlc),
        )
        .route(
            "/api/agents/download/{agent_type}/{file_id}",
            get(routes::downloads::download_report),
        )
        .route(
            "/api/agents/export/workflow/{workflow_id}",
            get(routes::downloads::export_workflow),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the API server on `host:port` with state wired from `config`.
pub async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    let app = build_router(AppState::from_config(config));

    let addr = format!("{}:{port}", config.server.host);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        output_dir = %config.output_dir().display(),
        "sdlc-flow API listening on http://{addr}"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

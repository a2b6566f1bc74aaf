use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, state::ApiState};

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))

        // Commands
        .route("/commands/preview", post(handlers::commands::preview_command))
        .route("/commands/run", post(handlers::commands::run_command))

        // Runs
        .route(
            "/runs",
            get(handlers::runs::list_runs).delete(handlers::runs::clear_runs),
        )
        .route("/runs/:run_id", get(handlers::runs::get_run))
        .route("/runs/:run_id/cancel", post(handlers::runs::cancel_run))

        // Chat history and statistics
        .route("/chat", get(handlers::chat::chat_history))
        .route("/stats", get(handlers::stats::get_statistics))

        // Workflow catalog
        .route("/repos/:owner/:repo/workflows", get(handlers::workflows::list_workflows))

        // Add state
        .with_state(state)

        // Add CORS and request tracing
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

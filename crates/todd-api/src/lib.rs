pub mod handlers;
pub mod routes;
pub mod session;
pub mod state;

// Re-exports
pub use routes::create_router;
pub use session::{CommandOutcome, TriggerFailure};
pub use state::ApiState;

/// Serve the HTTP API until the process is stopped.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("🚀 TODD API Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use todd_resolver::{ResolutionError, ResolutionPreview};

use super::{error, ApiError};
use crate::{session::CommandOutcome, state::ApiState};

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

fn resolution_error(e: ResolutionError) -> ApiError {
    let status = match e {
        ResolutionError::Llm(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error(status, e.to_string())
}

/// Resolve a command without triggering anything
pub async fn preview_command(
    State(state): State<ApiState>,
    Json(payload): Json<CommandRequest>,
) -> Result<Json<ResolutionPreview>, ApiError> {
    state
        .preview_command(&payload.command)
        .await
        .map(Json)
        .map_err(resolution_error)
}

/// Resolve, trigger and start tracking a command
pub async fn run_command(
    State(state): State<ApiState>,
    Json(payload): Json<CommandRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    state
        .run_command(&payload.command)
        .await
        .map(Json)
        .map_err(resolution_error)
}

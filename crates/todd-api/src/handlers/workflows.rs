use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use todd_github::{Repository, WorkflowInfo};

use super::{error, ApiError};
use crate::state::ApiState;

/// Workflows defined in a repository
pub async fn list_workflows(
    State(state): State<ApiState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Vec<WorkflowInfo>>, ApiError> {
    let repository = Repository::new(owner, repo);

    state
        .provider
        .list_workflows(&repository)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to list workflows for {}: {}", repository, e);
            let status = match e.status() {
                Some(404) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            };
            error(status, e.to_string())
        })
}

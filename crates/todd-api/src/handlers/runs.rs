use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use todd_core::{RunState, TestSummary};
use todd_tracker::{CancelError, TrackerPhase};

use super::{error, ApiError};
use crate::state::ApiState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    #[serde(flatten)]
    pub state: RunState,
    pub test_summary: TestSummary,
    pub is_terminal: bool,
}

impl From<RunState> for RunView {
    fn from(state: RunState) -> Self {
        Self {
            test_summary: state.test_summary(),
            is_terminal: state.is_terminal(),
            state,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsResponse {
    pub phase: TrackerPhase,
    pub runs: Vec<RunView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub run_id: u64,
    pub cancelled: bool,
    pub message: String,
}

pub async fn list_runs(State(state): State<ApiState>) -> Json<RunsResponse> {
    let runs = state.store.snapshot().await;
    Json(RunsResponse {
        phase: state.tracker.phase().await,
        runs: runs.runs().cloned().map(RunView::from).collect(),
    })
}

pub async fn get_run(
    State(state): State<ApiState>,
    Path(run_id): Path<u64>,
) -> Result<Json<RunView>, ApiError> {
    match state.store.get_run(run_id).await {
        Some(run) => Ok(Json(run.into())),
        None => Err(error(StatusCode::NOT_FOUND, format!("Run {} not found", run_id))),
    }
}

/// Request cancellation; an already finished run is a notice, not a failure
pub async fn cancel_run(
    State(state): State<ApiState>,
    Path(run_id): Path<u64>,
) -> Result<Json<CancelResponse>, ApiError> {
    match state.tracker.cancel_run(run_id).await {
        Ok(()) => Ok(Json(CancelResponse {
            run_id,
            cancelled: true,
            message: format!("Cancellation requested for run {}", run_id),
        })),
        Err(e @ CancelError::AlreadyFinished(_)) => Ok(Json(CancelResponse {
            run_id,
            cancelled: false,
            message: e.to_string(),
        })),
        Err(e @ CancelError::NotTracked(_)) => Err(error(StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => {
            tracing::error!("{}", e);
            Err(error(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

/// Clear run and chat history
pub async fn clear_runs(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    state
        .clear_history()
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

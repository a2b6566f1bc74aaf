use axum::{extract::State, Json};
use serde::Serialize;
use todd_core::DashboardStats;
use todd_tracker::TrackerPhase;

use crate::state::ApiState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub phase: TrackerPhase,
    #[serde(flatten)]
    pub stats: DashboardStats,
}

pub async fn get_statistics(State(state): State<ApiState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        phase: state.tracker.phase().await,
        stats: state.store.statistics().await,
    })
}

use axum::{extract::State, Json};
use todd_core::ChatMessage;

use crate::state::ApiState;

pub async fn chat_history(State(state): State<ApiState>) -> Json<Vec<ChatMessage>> {
    Json(state.store.chat_history().await)
}

use axum::{extract::State, Json};
use voxrelay_core::VoiceInfo;

use crate::state::AppState;

pub async fn list_voices(State(state): State<AppState>) -> Json<Vec<VoiceInfo>> {
    Json(state.voices.list())
}

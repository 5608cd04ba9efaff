use axum::{extract::State, Json};
use serde_json::{json, Value};
use voxrelay_core::{
    voices::{CANONICAL_VOICES, NATIVE_VOICES},
    AudioFormat,
};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let formats: Vec<&str> = AudioFormat::ALL.iter().map(|f| f.as_str()).collect();

    Json(json!({
        "status": "ok",
        "service": "voxrelay",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": {
            "name": "gemini",
            "model": state.provider.model()
        },
        "formats": formats,
        "streaming": true,
        "voices": {
            "canonical": CANONICAL_VOICES.len(),
            "native": NATIVE_VOICES.len()
        }
    }))
}

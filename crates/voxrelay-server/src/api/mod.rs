//! HTTP routes

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

mod health;
mod speech;
mod voices;

pub fn create_router(state: AppState) -> Router {
    let cors_enabled = state.config.cors_enabled;

    let router = Router::new()
        .route("/v1/audio/speech", post(speech::create_speech))
        .route("/v1/audio/voices", get(voices::list_voices))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

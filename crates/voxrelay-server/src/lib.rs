//! Voxrelay Server - OpenAI-compatible speech endpoint backed by Gemini TTS

pub mod api;
pub mod error;
pub mod state;

pub use api::create_router;
pub use state::AppState;

//! Upstream speech synthesis provider

mod gemini;
mod sse;
mod types;

pub use gemini::{frame_stream, FrameStream, GeminiClient};
pub use types::{GenerateContentRequest, GenerateContentResponse};

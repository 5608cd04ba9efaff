//! Voxrelay Core - OpenAI-compatible speech on top of Gemini TTS
//!
//! This crate holds everything between an accepted speech request and the
//! bytes written back to the client:
//!
//! - Format registry mapping `response_format` to content type and encoder flags
//! - Encoder subprocess (`ffmpeg`) with buffered and streaming modes
//! - Gemini client parsing the SSE stream into raw PCM frames
//! - Stream sessions wiring provider, encoder and response body together
//!   with backpressure and cancellation
//!
//! # Example
//!
//! ```ignore
//! use voxrelay_core::{GeminiClient, ProxyConfig, StreamSession, Transcoder, AudioFormat};
//!
//! let config = ProxyConfig::from_env()?;
//! let provider = GeminiClient::new(&config);
//! let transcoder = Transcoder::from_config(&config);
//!
//! let session = StreamSession::start(&provider, &transcoder, "Hello", "Kore", AudioFormat::Mp3).await?;
//! let body = session.into_body();
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod request;
pub mod voices;

pub use audio::{AudioFormat, AudioFrame, Transcoder};
pub use config::ProxyConfig;
pub use error::{Error, Result};
pub use pipeline::{synthesize_buffered, BodyStream, SessionOutcome, StreamSession};
pub use provider::GeminiClient;
pub use request::{SpeechRequest, SynthesisRequest, MAX_INPUT_CHARS};
pub use voices::{VoiceInfo, VoiceMap};

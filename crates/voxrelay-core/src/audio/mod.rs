//! Audio formats, frames and the encoder subprocess

mod format;
mod frame;
mod transcoder;

pub use format::{
    content_type_for, AudioFormat, TranscodeParams, BYTES_PER_SAMPLE, CHANNELS, SAMPLE_RATE,
};
pub use frame::AudioFrame;
pub use transcoder::{TranscodeInput, TranscodeOutput, Transcoder};

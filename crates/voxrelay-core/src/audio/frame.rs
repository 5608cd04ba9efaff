//! Raw PCM frames as delivered by the provider

use bytes::Bytes;

use super::format::{BYTES_PER_SAMPLE, CHANNELS, SAMPLE_RATE};

/// One chunk of s16le mono 24 kHz PCM, decoded from a single provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of whole samples in the frame
    pub fn sample_count(&self) -> usize {
        self.data.len() / (BYTES_PER_SAMPLE * CHANNELS as usize)
    }

    pub fn duration_ms(&self) -> f32 {
        (self.sample_count() as f32 / SAMPLE_RATE as f32) * 1000.0
    }
}

impl From<Vec<u8>> for AudioFrame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

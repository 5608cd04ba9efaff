//! Output format registry
//!
//! Maps an OpenAI `response_format` name to the response content type and to
//! the encoder parameters used to produce it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sample rate of the PCM audio produced by the provider
pub const SAMPLE_RATE: u32 = 24_000;
/// Channel count of the PCM audio produced by the provider
pub const CHANNELS: u16 = 1;
/// Bytes per sample of the PCM audio (signed 16-bit little-endian)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Opus,
    Aac,
    Flac,
    /// Raw s16le PCM, forwarded without transcoding
    Pcm,
}

/// Encoder invocation parameters for one output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeParams {
    /// Container passed to the encoder's `-f` flag
    pub container: &'static str,
    /// Target bitrate in kbit/s, `None` leaves the encoder default
    pub bitrate_kbps: Option<u32>,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Opus,
        AudioFormat::Aac,
        AudioFormat::Flac,
        AudioFormat::Pcm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Pcm => "pcm",
        }
    }

    /// Get content type for format
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Opus => "audio/opus",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Pcm => "audio/pcm",
        }
    }

    /// True for the identity format that bypasses the encoder.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, AudioFormat::Pcm)
    }

    /// Encoder parameters, `None` for the pass-through format.
    pub fn transcode_params(&self) -> Option<TranscodeParams> {
        let params = match self {
            AudioFormat::Mp3 => TranscodeParams {
                container: "mp3",
                bitrate_kbps: Some(128),
            },
            AudioFormat::Opus => TranscodeParams {
                container: "opus",
                bitrate_kbps: Some(64),
            },
            AudioFormat::Wav => TranscodeParams {
                container: "wav",
                bitrate_kbps: None,
            },
            // the raw AAC container is called ADTS by the encoder
            AudioFormat::Aac => TranscodeParams {
                container: "adts",
                bitrate_kbps: None,
            },
            AudioFormat::Flac => TranscodeParams {
                container: "flac",
                bitrate_kbps: None,
            },
            AudioFormat::Pcm => return None,
        };
        Some(params)
    }

    /// Parse a requested format name, falling back to mp3 for unknown names.
    pub fn from_name_or_default(name: Option<&str>) -> Self {
        match name {
            None => AudioFormat::default(),
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown response_format {:?}, falling back to mp3", name);
                AudioFormat::default()
            }),
        }
    }
}

/// Content type for an arbitrary format name; unknown names get the mp3 type.
pub fn content_type_for(name: &str) -> &'static str {
    name.parse::<AudioFormat>()
        .unwrap_or_default()
        .content_type()
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            "opus" => Ok(AudioFormat::Opus),
            "aac" => Ok(AudioFormat::Aac),
            "flac" => Ok(AudioFormat::Flac),
            "pcm" => Ok(AudioFormat::Pcm),
            other => Err(format!("unsupported audio format: {}", other)),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! OpenAI-compatible speech request and its validation

use serde::Deserialize;
use tracing::debug;

use crate::audio::AudioFormat;
use crate::error::{Error, Result};

/// Maximum input length, in characters
pub const MAX_INPUT_CHARS: usize = 4096;

/// Body of `POST /v1/audio/speech` as sent by the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub response_format: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// A validated synthesis request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    text: String,
    voice: Option<String>,
    format: AudioFormat,
    stream: bool,
}

impl SynthesisRequest {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The voice as requested, before mapping
    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }
}

impl SpeechRequest {
    /// Validate the request before any upstream call is made.
    pub fn validate(self) -> Result<SynthesisRequest> {
        let text = self.input.unwrap_or_default();
        validate_input(&text)?;

        if let Some(model) = &self.model {
            debug!("Ignoring requested model {}", model);
        }
        if let Some(speed) = self.speed {
            debug!("Ignoring requested speed {}", speed);
        }

        Ok(SynthesisRequest {
            text,
            voice: self.voice,
            format: AudioFormat::from_name_or_default(self.response_format.as_deref()),
            stream: self.stream.unwrap_or(false),
        })
    }
}

/// Validate input text length
pub fn validate_input(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(Error::Validation("Input text is required".to_string()));
    }
    let chars = text.chars().count();
    if chars > MAX_INPUT_CHARS {
        return Err(Error::Validation(format!(
            "Input text too long ({} characters, max {})",
            chars, MAX_INPUT_CHARS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> SpeechRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_request() {
        let req = request(json!({
            "input": "Hello world",
            "voice": "alloy",
            "model": "tts-1",
            "response_format": "pcm",
            "speed": 1.25,
            "stream": true
        }))
        .validate()
        .unwrap();
        assert_eq!(req.text(), "Hello world");
        assert_eq!(req.voice(), Some("alloy"));
        assert_eq!(req.format(), AudioFormat::Pcm);
        assert!(req.is_streaming());
    }

    #[test]
    fn test_defaults() {
        let req = request(json!({"input": "Hi"})).validate().unwrap();
        assert_eq!(req.format(), AudioFormat::Mp3);
        assert_eq!(req.voice(), None);
        assert!(!req.is_streaming());
    }

    #[test]
    fn test_missing_or_empty_input() {
        assert!(matches!(
            request(json!({"voice": "alloy"})).validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            request(json!({"input": ""})).validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_length_bounds_count_characters() {
        assert!(validate_input("a").is_ok());
        assert!(validate_input(&"a".repeat(MAX_INPUT_CHARS)).is_ok());
        // multi-byte characters count once each
        assert!(validate_input(&"é".repeat(MAX_INPUT_CHARS)).is_ok());

        let err = validate_input(&"a".repeat(MAX_INPUT_CHARS + 1)).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }
}

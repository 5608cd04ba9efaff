//! Error types for the voxrelay pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad client input, rejected before any resource is allocated.
    #[error("{0}")]
    Validation(String),

    /// Non-success response from the synthesis provider.
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// The session was cancelled, normally because the client went away.
    #[error("Request aborted")]
    Aborted,

    #[error("Failed to start encoder: {0}")]
    ProcessStart(String),

    #[error("Transcoding failed: {0}")]
    Transcode(String),

    #[error("Invalid audio payload: {0}")]
    InvalidAudio(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True when the error represents a deliberate early termination.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::InvalidAudio(e.to_string())
    }
}

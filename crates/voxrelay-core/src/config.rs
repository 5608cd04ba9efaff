//! Configuration types for the voxrelay proxy

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Process-wide configuration, loaded once at startup from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// API key for the Gemini API (`GEMINI_API_KEY`)
    #[serde(rename = "gemini_api_key", default)]
    pub api_key: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Native voice used when the requested voice is unknown
    #[serde(default = "default_voice")]
    pub default_voice: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Encoder binary, resolved through `PATH` when not absolute
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,
}

impl ProxyConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::default())
    }

    /// Load configuration from an explicit variable map instead of the
    /// process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::load(config::Environment::default().source(Some(vars)))
    }

    fn load(source: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(source.try_parsing(true))
            .build()?;

        let config: ProxyConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("GEMINI_API_KEY is not set".to_string()));
        }
        if self.default_voice.trim().is_empty() {
            return Err(Error::Config("DEFAULT_VOICE must not be empty".to_string()));
        }
        Ok(())
    }

    /// Socket address string the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configuration pointing at a custom provider endpoint, used by tests.
    pub fn for_endpoint(base_url: impl Into<String>) -> Self {
        Self {
            api_key: "test-key".to_string(),
            gemini_base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            host: default_host(),
            port: default_port(),
            default_voice: default_voice(),
            log_level: default_log_level(),
            gemini_model: default_gemini_model(),
            gemini_base_url: default_gemini_base_url(),
            ffmpeg_path: default_ffmpeg_path(),
            cors_enabled: default_cors_enabled(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_voice() -> String {
    "Kore".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_cors_enabled() -> bool {
    true
}

//! Application state management

use std::sync::Arc;

use voxrelay_core::{GeminiClient, ProxyConfig, Transcoder, VoiceMap};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub provider: Arc<GeminiClient>,
    pub transcoder: Arc<Transcoder>,
    pub voices: Arc<VoiceMap>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            provider: Arc::new(GeminiClient::new(&config)),
            transcoder: Arc::new(Transcoder::from_config(&config)),
            voices: Arc::new(VoiceMap::new(config.default_voice.clone())),
            config: Arc::new(config),
        }
    }
}

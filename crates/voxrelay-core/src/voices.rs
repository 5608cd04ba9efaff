//! Static voice registry
//!
//! OpenAI voice names map onto Gemini prebuilt voices. Names that already
//! belong to Gemini pass through; anything else gets the configured default.

use serde::Serialize;

/// OpenAI voice name and the Gemini voice it is rendered with
pub const CANONICAL_VOICES: &[(&str, &str)] = &[
    ("alloy", "Kore"),
    ("ash", "Orus"),
    ("coral", "Leda"),
    ("echo", "Charon"),
    ("fable", "Aoede"),
    ("nova", "Puck"),
    ("onyx", "Fenrir"),
    ("sage", "Iapetus"),
    ("shimmer", "Zephyr"),
];

/// Gemini prebuilt voices
pub const NATIVE_VOICES: &[&str] = &[
    "Achernar",
    "Achird",
    "Algenib",
    "Algieba",
    "Alnilam",
    "Aoede",
    "Autonoe",
    "Callirrhoe",
    "Charon",
    "Despina",
    "Enceladus",
    "Erinome",
    "Fenrir",
    "Gacrux",
    "Iapetus",
    "Kore",
    "Laomedeia",
    "Leda",
    "Orus",
    "Puck",
    "Pulcherrima",
    "Rasalgethi",
    "Sadachbia",
    "Sadaltager",
    "Schedar",
    "Sulafat",
    "Umbriel",
    "Vindemiatrix",
    "Zephyr",
    "Zubenelgenubi",
];

/// Entry in the `/v1/audio/voices` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    pub voice_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VoiceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    Openai,
    Gemini,
}

/// Resolves requested voice names to Gemini voices
#[derive(Debug, Clone)]
pub struct VoiceMap {
    default_voice: String,
}

impl VoiceMap {
    pub fn new(default_voice: impl Into<String>) -> Self {
        Self {
            default_voice: default_voice.into(),
        }
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    /// Resolve a requested voice. Never fails.
    pub fn resolve(&self, requested: Option<&str>) -> &str {
        let Some(name) = requested.map(str::trim).filter(|n| !n.is_empty()) else {
            return &self.default_voice;
        };

        if let Some((_, native)) = CANONICAL_VOICES
            .iter()
            .find(|(canonical, _)| canonical.eq_ignore_ascii_case(name))
        {
            return native;
        }

        NATIVE_VOICES
            .iter()
            .find(|native| native.eq_ignore_ascii_case(name))
            .copied()
            .unwrap_or(self.default_voice.as_str())
    }

    /// All voices accepted by the speech endpoint
    pub fn list(&self) -> Vec<VoiceInfo> {
        let canonical = CANONICAL_VOICES.iter().map(|(name, native)| VoiceInfo {
            voice_id: name.to_string(),
            name: capitalize(name),
            kind: VoiceKind::Openai,
            mapped_to: Some(native.to_string()),
        });
        let native = NATIVE_VOICES.iter().map(|name| VoiceInfo {
            voice_id: name.to_string(),
            name: name.to_string(),
            kind: VoiceKind::Gemini,
            mapped_to: None,
        });
        canonical.chain(native).collect()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

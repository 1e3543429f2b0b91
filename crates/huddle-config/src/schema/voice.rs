//! Voice input configuration types.

use serde::{Deserialize, Serialize};

/// How the microphone decides when the local user is talking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputModeSetting {
    /// Voice activity detection drives the talking indicator.
    #[default]
    Activity,
    /// The microphone is live only while the bound key is held.
    PushToTalk,
}

/// Voice-activity detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadSection {
    /// Sampling interval in milliseconds.
    pub interval_ms: u64,
    /// Mean normalized spectral magnitude above which a sample is loud.
    pub threshold: f64,
    /// Consecutive quiet samples required before talking stops.
    pub release_samples: u32,
}

impl Default for VadSection {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            threshold: 0.06,
            release_samples: 8,
        }
    }
}

/// Voice channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSection {
    pub input_mode: InputModeSetting,
    pub ptt_key: String,
    pub vad: VadSection,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self {
            input_mode: InputModeSetting::Activity,
            ptt_key: "Backquote".into(),
            vad: VadSection::default(),
        }
    }
}

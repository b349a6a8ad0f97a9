use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::client::{EngineConfig, DEFAULT_BASE_URL};
use crate::engine::types::SpeakerId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackBackend {
    /// Hand a temporary WAV file to an external player
    #[default]
    Command,
    /// Play on the default output device (requires the `audio` feature)
    Device,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: None,
        }
    }
}

impl EngineSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            base_url: self.base_url.clone(),
            timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PlaybackSettings {
    #[serde(default)]
    pub backend: PlaybackBackend,

    /// Player binary name or path for the command backend
    #[serde(default)]
    pub player: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_speaker")]
    pub default_speaker: String,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub playback: PlaybackSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_speaker: default_speaker(),
            engine: EngineSettings::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl Settings {
    pub fn speaker(&self) -> SpeakerId {
        SpeakerId::new(self.default_speaker.clone())
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_speaker() -> String {
    "1".to_string()
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SpeakError;

/// Voice style selector sent as the `speaker` query parameter. Opaque to the
/// client: whatever the caller supplies is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerId(String);

impl SpeakerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpeakerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SpeakerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u32> for SpeakerId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

/// Validated input for one synthesis round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    text: String,
    speaker: SpeakerId,
}

impl SynthesisRequest {
    /// Trims `text` and rejects it if nothing is left.
    pub fn new(text: &str, speaker: SpeakerId) -> Result<Self, SpeakError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeakError::Validation);
        }
        Ok(Self {
            text: text.to_string(),
            speaker,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn speaker(&self) -> &SpeakerId {
        &self.speaker
    }
}

/// Query document produced by `audio_query`. Never inspected, only handed
/// back to `synthesis` as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynthesisQuery(serde_json::Value);

impl SynthesisQuery {
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for SynthesisQuery {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Audio bytes returned by `synthesis` (a WAV container for VOICEVOX).
#[derive(Clone, PartialEq, Eq)]
pub struct AudioPayload {
    bytes: Vec<u8>,
}

impl AudioPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for AudioPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPayload")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Entry of the engine's `/speakers` catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    #[serde(default)]
    pub speaker_uuid: String,
    #[serde(default)]
    pub styles: Vec<SpeakerStyle>,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: u32,
}

impl SpeakerStyle {
    pub fn speaker_id(&self) -> SpeakerId {
        SpeakerId::from(self.id)
    }
}

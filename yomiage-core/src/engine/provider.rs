use async_trait::async_trait;

use super::types::{AudioPayload, Speaker, SpeakerId};
use crate::error::SpeakError;

/// Trait for speech synthesis backends
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Turn text into playable audio for the given speaker
    async fn synthesize_to_audio(
        &self,
        text: &str,
        speaker: &SpeakerId,
    ) -> Result<AudioPayload, SpeakError>;

    /// List available speakers
    async fn list_speakers(&self) -> Result<Vec<Speaker>, SpeakError>;
}

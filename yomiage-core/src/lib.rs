pub mod engine;
pub mod error;
pub mod narrator;
pub mod playback;
pub mod settings;

// Public library API for front ends embedding the read-aloud pipeline.
pub use engine::client::{EngineConfig, SynthesisClient};
pub use engine::provider::SpeechSynthesizer;
pub use engine::types::{AudioPayload, Speaker, SpeakerId, SpeakerStyle, SynthesisQuery};
pub use error::{ErrorKind, Phase, SpeakError};
pub use narrator::{Narrator, PlaybackHandle, PlaybackStopper};
pub use playback::{EndReason, PlaybackError, PlaybackFacility, SourceId};
pub use settings::{Settings, SettingsManager};

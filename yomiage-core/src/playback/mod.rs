//! Playback facilities for synthesized audio
//!
//! A facility turns an [`AudioPayload`] into a transient, addressable
//! [`SourceId`], plays it, and notifies once playback is over. Every loaded
//! source must be released exactly once; [`SourceLease`] enforces that by
//! ownership.

pub mod command;
#[cfg(feature = "audio")]
pub mod device;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::engine::types::AudioPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

/// Why a playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Finished,
    Stopped,
    Failed(String),
}

/// End-of-playback notification. Fires once; a dropped sender means the
/// facility gave up on the source.
pub type PlaybackEnd = oneshot::Receiver<EndReason>;

#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The facility would not start playback (no output, player missing,
    /// platform restriction).
    #[error("playback was refused: {0}")]
    Refused(String),

    #[error("audio payload could not be loaded: {0}")]
    InvalidAudio(String),

    #[error("unknown audio source {0}")]
    UnknownSource(SourceId),

    #[error("audio output failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for audio playback capabilities
#[async_trait]
pub trait PlaybackFacility: Send + Sync {
    /// Take ownership of the payload and expose it as a playable source
    fn load(&self, audio: AudioPayload) -> Result<SourceId, PlaybackError>;

    /// Start playing; resolves once playback has started
    async fn play(&self, source: SourceId) -> Result<PlaybackEnd, PlaybackError>;

    /// Ask a playing source to end early. The end notification reports `Stopped`.
    fn stop(&self, source: SourceId);

    /// Drop the transient reference created by `load`
    fn release(&self, source: SourceId);
}

/// Owns one loaded source and releases it on drop.
pub(crate) struct SourceLease {
    playback: Arc<dyn PlaybackFacility>,
    source: SourceId,
}

impl SourceLease {
    pub(crate) fn new(playback: Arc<dyn PlaybackFacility>, source: SourceId) -> Self {
        Self { playback, source }
    }

    pub(crate) fn source(&self) -> SourceId {
        self.source
    }
}

impl Drop for SourceLease {
    fn drop(&mut self) {
        tracing::debug!(source = %self.source, "releasing audio source");
        self.playback.release(self.source);
    }
}

//! Read-aloud entry point: synthesize, play, and release the source once
//! playback is over.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info};

use crate::engine::provider::SpeechSynthesizer;
use crate::engine::types::SpeakerId;
use crate::error::SpeakError;
use crate::playback::{EndReason, PlaybackFacility, SourceId, SourceLease};

#[derive(Clone)]
pub struct Narrator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    playback: Arc<dyn PlaybackFacility>,
}

impl Narrator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        playback: Arc<dyn PlaybackFacility>,
    ) -> Self {
        Self {
            synthesizer,
            playback,
        }
    }

    pub fn synthesizer(&self) -> &Arc<dyn SpeechSynthesizer> {
        &self.synthesizer
    }

    /// Synthesize `text` and start playing it. Returns once playback has
    /// started. Every failure is logged here before being handed back; no
    /// audio source outlives a failed call.
    pub async fn speak(
        &self,
        text: &str,
        speaker: &SpeakerId,
    ) -> Result<PlaybackHandle, SpeakError> {
        let result = self.try_speak(text, speaker).await;
        if let Err(e) = &result {
            error!(
                kind = ?e.kind(),
                phase = ?e.phase(),
                status = ?e.status(),
                error = %e,
                "speak failed"
            );
        }
        result
    }

    async fn try_speak(
        &self,
        text: &str,
        speaker: &SpeakerId,
    ) -> Result<PlaybackHandle, SpeakError> {
        let audio = self.synthesizer.synthesize_to_audio(text, speaker).await?;

        let source = self.playback.load(audio)?;
        let lease = SourceLease::new(self.playback.clone(), source);

        // Dropping the lease on a refused start releases the source.
        let ended = self.playback.play(lease.source()).await?;
        info!(source = %source, speaker = %speaker, "speaking");

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let reason = ended.await.unwrap_or_else(|_| {
                EndReason::Failed("playback ended without notification".to_string())
            });
            drop(lease);
            info!(source = %source, reason = ?reason, "playback ended");
            let _ = done_tx.send(reason);
        });

        Ok(PlaybackHandle {
            source,
            playback: self.playback.clone(),
            done: done_rx,
        })
    }
}

/// A playback in progress. The source is released when playback ends,
/// whether or not this handle is awaited.
pub struct PlaybackHandle {
    source: SourceId,
    playback: Arc<dyn PlaybackFacility>,
    done: oneshot::Receiver<EndReason>,
}

impl PlaybackHandle {
    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn stop(&self) {
        self.playback.stop(self.source);
    }

    /// Detached stop control, usable after the handle has been consumed.
    pub fn stopper(&self) -> PlaybackStopper {
        PlaybackStopper {
            source: self.source,
            playback: self.playback.clone(),
        }
    }

    /// Wait for playback to end. The source has been released by the time
    /// this resolves.
    pub async fn finished(self) -> EndReason {
        self.done.await.unwrap_or_else(|_| {
            EndReason::Failed("playback watcher exited without reporting".to_string())
        })
    }
}

#[derive(Clone)]
pub struct PlaybackStopper {
    source: SourceId,
    playback: Arc<dyn PlaybackFacility>,
}

impl PlaybackStopper {
    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn stop(&self) {
        self.playback.stop(self.source);
    }
}

use std::fmt;

use thiserror::Error;

use crate::playback::PlaybackError;

/// Engine call that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BuildQuery,
    Synthesize,
    ListSpeakers,
}

impl Phase {
    /// Endpoint path of the engine call, relative to the base URL.
    pub fn path(self) -> &'static str {
        match self {
            Phase::BuildQuery => "audio_query",
            Phase::Synthesize => "synthesis",
            Phase::ListSpeakers => "speakers",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Upstream,
    Transport,
    Playback,
}

#[derive(Error, Debug)]
pub enum SpeakError {
    #[error("text must not be empty")]
    Validation,

    #[error("{phase} failed with status {status}")]
    Upstream { phase: Phase, status: u16 },

    #[error("{phase} request failed: {source}")]
    Transport {
        phase: Phase,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl SpeakError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpeakError::Validation => ErrorKind::Validation,
            SpeakError::Upstream { .. } => ErrorKind::Upstream,
            SpeakError::Transport { .. } => ErrorKind::Transport,
            SpeakError::Playback(_) => ErrorKind::Playback,
        }
    }

    /// HTTP status returned by the engine, if the engine answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            SpeakError::Upstream { status, .. } => Some(*status),
            SpeakError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            SpeakError::Upstream { phase, .. } | SpeakError::Transport { phase, .. } => {
                Some(*phase)
            }
            _ => None,
        }
    }
}

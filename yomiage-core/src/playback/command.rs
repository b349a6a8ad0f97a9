//! Playback through an external player binary
//!
//! Each loaded payload becomes a temporary `.wav` file that lives until the
//! source is released.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{EndReason, PlaybackEnd, PlaybackError, PlaybackFacility, SourceId};
use crate::engine::types::AudioPayload;

const KNOWN_PLAYERS: [&str; 4] = ["aplay", "paplay", "afplay", "ffplay"];

/// Player binary plus the arguments placed before the file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl PlayerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Resolve `preferred` (a name or path) or the first known player on PATH.
    pub fn detect(preferred: Option<&str>) -> Option<Self> {
        if let Some(name) = preferred {
            if let Some(path) = find_in_path(name) {
                return Some(Self::for_binary(path));
            }
            warn!(player = name, "configured player not found, trying defaults");
        }
        KNOWN_PLAYERS
            .iter()
            .find_map(|name| find_in_path(name))
            .map(Self::for_binary)
    }

    fn for_binary(program: PathBuf) -> Self {
        let name = program
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let args = match name {
            "ffplay" => vec!["-autoexit", "-nodisp", "-loglevel", "quiet"],
            "aplay" => vec!["-q"],
            _ => vec![],
        };
        Self::new(program, args.into_iter().map(String::from).collect())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

fn find_in_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(bin);
        return path.exists().then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}

struct CommandSource {
    file: NamedTempFile,
    stop: Option<oneshot::Sender<()>>,
}

pub struct CommandPlayback {
    player: Option<PlayerCommand>,
    next_id: AtomicU64,
    sources: Mutex<HashMap<SourceId, CommandSource>>,
}

impl CommandPlayback {
    pub fn new(player: Option<PlayerCommand>) -> Self {
        match &player {
            Some(p) => info!(player = ?p.program, "using external audio player"),
            None => warn!("no external audio player found"),
        }
        Self {
            player,
            next_id: AtomicU64::new(1),
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Detect a player on PATH, honouring `preferred` first.
    pub fn detect(preferred: Option<&str>) -> Self {
        Self::new(PlayerCommand::detect(preferred))
    }

    /// Location of the temporary file backing `source`, while it is loaded.
    pub fn source_path(&self, source: SourceId) -> Option<PathBuf> {
        self.lock()
            .get(&source)
            .map(|s| s.file.path().to_path_buf())
    }

    pub fn loaded(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SourceId, CommandSource>> {
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PlaybackFacility for CommandPlayback {
    fn load(&self, audio: AudioPayload) -> Result<SourceId, PlaybackError> {
        if audio.is_empty() {
            return Err(PlaybackError::InvalidAudio("payload is empty".to_string()));
        }

        let mut file = tempfile::Builder::new()
            .prefix("yomiage-")
            .suffix(".wav")
            .tempfile()?;
        file.write_all(audio.as_bytes())?;
        file.flush()?;

        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(source = %id, path = ?file.path(), bytes = audio.len(), "loaded audio source");
        self.lock().insert(id, CommandSource { file, stop: None });
        Ok(id)
    }

    async fn play(&self, source: SourceId) -> Result<PlaybackEnd, PlaybackError> {
        let player = self.player.as_ref().ok_or_else(|| {
            PlaybackError::Refused(format!(
                "no audio player found (looked for {})",
                KNOWN_PLAYERS.join(", ")
            ))
        })?;

        let (path, stop_rx) = {
            let mut sources = self.lock();
            let entry = sources
                .get_mut(&source)
                .ok_or(PlaybackError::UnknownSource(source))?;
            let (stop_tx, stop_rx) = oneshot::channel();
            entry.stop = Some(stop_tx);
            (entry.file.path().to_path_buf(), stop_rx)
        };

        let mut child = Command::new(&player.program)
            .args(&player.args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PlaybackError::Refused(format!(
                    "failed to start {}: {e}",
                    player.program.display()
                ))
            })?;

        info!(source = %source, player = ?player.program, "playback started");

        let (end_tx, end_rx) = oneshot::channel();
        tokio::spawn(async move {
            let reason = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => EndReason::Finished,
                    Ok(status) => EndReason::Failed(format!("player exited with {status}")),
                    Err(e) => EndReason::Failed(e.to_string()),
                },
                _ = stop_rx => {
                    if let Err(e) = child.kill().await {
                        warn!(source = %source, error = %e, "failed to kill player");
                    }
                    EndReason::Stopped
                }
            };
            debug!(source = %source, reason = ?reason, "player exited");
            let _ = end_tx.send(reason);
        });

        Ok(end_rx)
    }

    fn stop(&self, source: SourceId) {
        let stop = self.lock().get_mut(&source).and_then(|s| s.stop.take());
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
    }

    fn release(&self, source: SourceId) {
        if self.lock().remove(&source).is_none() {
            warn!(source = %source, "release of unknown audio source");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> PlayerCommand {
        PlayerCommand::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn wav() -> AudioPayload {
        AudioPayload::new(b"RIFF\x24\x00\x00\x00WAVE".to_vec())
    }

    #[tokio::test]
    async fn test_plays_loaded_file_to_completion() {
        // The file path arrives as $0.
        let playback = CommandPlayback::new(Some(shell("test -s \"$0\"")));
        let id = playback.load(wav()).unwrap();
        let ended = playback.play(id).await.unwrap();
        assert_eq!(ended.await.unwrap(), EndReason::Finished);
    }

    #[tokio::test]
    async fn test_release_removes_temporary_file() {
        let playback = CommandPlayback::new(Some(shell("exit 0")));
        let id = playback.load(wav()).unwrap();
        let path = playback.source_path(id).unwrap();
        assert!(path.exists());

        playback.release(id);
        assert!(!path.exists());
        assert_eq!(playback.loaded(), 0);
    }

    #[tokio::test]
    async fn test_stop_ends_playback() {
        let playback = CommandPlayback::new(Some(shell("sleep 30")));
        let id = playback.load(wav()).unwrap();
        let ended = playback.play(id).await.unwrap();
        playback.stop(id);
        assert_eq!(ended.await.unwrap(), EndReason::Stopped);
    }

    #[tokio::test]
    async fn test_failing_player_reports_failure() {
        let playback = CommandPlayback::new(Some(shell("exit 3")));
        let id = playback.load(wav()).unwrap();
        let ended = playback.play(id).await.unwrap();
        assert!(matches!(ended.await.unwrap(), EndReason::Failed(_)));
    }

    #[tokio::test]
    async fn test_missing_player_is_refused() {
        let playback = CommandPlayback::new(None);
        let id = playback.load(wav()).unwrap();
        let err = playback.play(id).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Refused(_)));
    }

    #[tokio::test]
    async fn test_unstartable_player_is_refused() {
        let playback = CommandPlayback::new(Some(PlayerCommand::new(
            "/nonexistent/yomiage-player",
            vec![],
        )));
        let id = playback.load(wav()).unwrap();
        let err = playback.play(id).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Refused(_)));
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        let playback = CommandPlayback::new(None);
        let err = playback.load(AudioPayload::new(Vec::new())).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidAudio(_)));
    }

    #[test]
    fn test_ffplay_gets_headless_flags() {
        let cmd = PlayerCommand::for_binary(PathBuf::from("/usr/bin/ffplay"));
        assert_eq!(cmd.args[0], "-autoexit");
        assert!(cmd.args.contains(&"-nodisp".to_string()));
    }
}

use yomiage_core::{ErrorKind, SpeakError, Speaker};

/// User-facing message for a failed read-aloud. Branches on the error kind,
/// never on message text.
pub fn describe(err: &SpeakError, engine_url: &str) -> String {
    match err.kind() {
        ErrorKind::Validation => "Please enter some text to read aloud.".to_string(),
        ErrorKind::Playback => {
            format!("Playback was blocked ({err}). Check your audio output settings.")
        }
        ErrorKind::Upstream | ErrorKind::Transport => format!(
            "Could not get audio from the VOICEVOX engine at {engine_url} ({err}). \
             Check that the engine is running on that port."
        ),
    }
}

/// One line per style: `<id>  <speaker> (<style>)`.
pub fn format_speakers(speakers: &[Speaker]) -> String {
    let mut lines = Vec::new();
    for speaker in speakers {
        for style in &speaker.styles {
            lines.push(format!("{:>4}  {} ({})", style.id, speaker.name, style.name));
        }
    }
    lines.join("\n")
}

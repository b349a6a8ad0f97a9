use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use yomiage_core::playback::command::CommandPlayback;
use yomiage_core::settings::PlaybackBackend;
use yomiage_core::{
    EndReason, Narrator, PlaybackFacility, SettingsManager, SpeakError, SpeakerId,
    SpeechSynthesizer, SynthesisClient,
};

mod app;
mod commands;
mod report;
mod trigger;

use crate::app::InteractiveApp;
use crate::report::{describe, format_speakers};

#[derive(Parser, Debug)]
#[command(name = "yomiage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Read text aloud through a VOICEVOX engine")]
struct Args {
    /// Text to read aloud. Starts line-by-line interactive mode when omitted
    text: Option<String>,

    /// Speaker (voice style) id
    #[arg(long, value_name = "ID")]
    speaker: Option<String>,

    /// Base URL of the engine
    #[arg(long, value_name = "URL")]
    engine_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Write the synthesized WAV to a file instead of playing it
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,

    /// Print the engine's speakers and exit
    #[arg(long)]
    list_speakers: bool,

    /// Load settings from a specific file
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    setup_tracing()?;

    // Multi-threaded so playback keeps running while the prompt blocks.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    info!(
        "CLI startup: speaker={:?}, engine_url={:?}, save={:?}, list_speakers={}",
        args.speaker, args.engine_url, args.save, args.list_speakers
    );

    let settings = match &args.settings {
        Some(path) => SettingsManager::from_path(path.clone())?,
        None => SettingsManager::new()?,
    };

    apply_overrides(&args, &settings);

    let current = settings.settings();
    let engine_url = current.engine.base_url.clone();
    let client = SynthesisClient::new(current.engine.engine_config())?;

    if args.list_speakers {
        let speakers = client
            .list_speakers()
            .await
            .map_err(|e| report_failure(e, &engine_url))?;
        println!("{}", format_speakers(&speakers));
        return Ok(());
    }

    if let Some(path) = &args.save {
        let Some(text) = &args.text else {
            bail!("--save requires TEXT to synthesize");
        };
        let audio = client
            .synthesize_to_audio(text, &current.speaker())
            .await
            .map_err(|e| report_failure(e, &engine_url))?;
        tokio::fs::write(path, audio.as_bytes())
            .await
            .with_context(|| format!("Failed to write audio to {}", path.display()))?;
        println!("Saved {} bytes to {}", audio.len(), path.display());
        return Ok(());
    }

    let playback = build_playback(current.playback.backend, current.playback.player.as_deref())?;
    let narrator = Narrator::new(Arc::new(client), playback);

    match args.text {
        Some(text) => speak_once(&narrator, &text, &current.speaker(), &engine_url).await,
        None => {
            let mut app = InteractiveApp::new(narrator, settings, engine_url);
            app.run().await
        }
    }
}

/// Flags override the file for this run only; nothing is saved.
fn apply_overrides(args: &Args, settings: &SettingsManager) {
    settings.update_setting(|s| {
        if let Some(speaker) = &args.speaker {
            s.default_speaker = speaker.clone();
        }
        if let Some(url) = &args.engine_url {
            s.engine.base_url = url.clone();
        }
        if let Some(secs) = args.timeout {
            s.engine.request_timeout_secs = Some(secs);
        }
    });
}

async fn speak_once(
    narrator: &Narrator,
    text: &str,
    speaker: &SpeakerId,
    engine_url: &str,
) -> Result<()> {
    let handle = narrator
        .speak(text, speaker)
        .await
        .map_err(|e| report_failure(e, engine_url))?;
    let stopper = handle.stopper();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let reason = handle.finished().await;
    interrupt.abort();

    match reason {
        EndReason::Failed(reason) => bail!("Playback failed: {reason}"),
        EndReason::Finished | EndReason::Stopped => Ok(()),
    }
}

fn build_playback(
    backend: PlaybackBackend,
    player: Option<&str>,
) -> Result<Arc<dyn PlaybackFacility>> {
    match backend {
        PlaybackBackend::Command => Ok(Arc::new(CommandPlayback::detect(player))),
        #[cfg(feature = "audio")]
        PlaybackBackend::Device => Ok(Arc::new(
            yomiage_core::playback::device::DevicePlayback::new()?,
        )),
        #[cfg(not(feature = "audio"))]
        PlaybackBackend::Device => {
            bail!("the device playback backend requires building with the `audio` feature")
        }
    }
}

fn report_failure(err: SpeakError, engine_url: &str) -> anyhow::Error {
    let message = describe(&err, engine_url);
    anyhow::Error::new(err).context(message)
}

fn setup_tracing() -> Result<()> {
    use std::fs;
    use tracing_subscriber::fmt;

    let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
    let trace_dir = home.join(".yomiage").join("trace");
    fs::create_dir_all(&trace_dir)?;

    let log_file = trace_dir.join("yomiage.log");
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Tracing initialized to {:?}", log_file);
    Ok(())
}

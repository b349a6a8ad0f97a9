use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use yomiage_core::{EndReason, Narrator, PlaybackStopper, SpeakError, SpeakerId, SettingsManager};

use crate::commands::{parse_local_command, LocalCommand, HELP};
use crate::report::{describe, format_speakers};
use crate::trigger::{Trigger, TriggerGuard};

/// The line in flight. A stop that arrives before playback has started is
/// remembered and applied as soon as it does.
#[derive(Default)]
pub struct InFlight {
    stopper: Option<PlaybackStopper>,
    stop_requested: bool,
}

type CurrentPlayback = Arc<Mutex<InFlight>>;

/// Line-by-line read-aloud session. Each line is spoken in the background so
/// `/stop` stays responsive; the trigger turns away new lines meanwhile.
pub struct InteractiveApp {
    narrator: Narrator,
    settings: SettingsManager,
    engine_url: String,
    trigger: Trigger,
    current: CurrentPlayback,
    last: Option<JoinHandle<()>>,
}

impl InteractiveApp {
    pub fn new(narrator: Narrator, settings: SettingsManager, engine_url: String) -> Self {
        Self {
            narrator,
            settings,
            engine_url,
            trigger: Trigger::default(),
            current: CurrentPlayback::default(),
            last: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;

        println!(
            "Reading aloud with speaker {}. Type /help for commands, /quit to exit",
            self.settings.settings().default_speaker
        );

        loop {
            // Playback tasks keep running on the other workers while we block.
            let prompt = if self.trigger.is_enabled() {
                "> "
            } else {
                "(speaking) > "
            };
            let line = match tokio::task::block_in_place(|| rl.readline(prompt)) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    self.stop_current();
                    continue;
                }
                Err(_) => break,
            };

            match parse_local_command(&line) {
                LocalCommand::Speakers => self.print_speakers().await,
                LocalCommand::UseSpeaker(id) => {
                    self.settings
                        .update_setting(|settings| settings.default_speaker = id.clone());
                    println!("Speaker set to {id}");
                }
                LocalCommand::Stop => self.stop_current(),
                LocalCommand::Help => println!("{HELP}"),
                LocalCommand::Exit => break,
                LocalCommand::Text => self.read_aloud(line, &mut rl),
            }
        }

        self.stop_current();
        if let Some(task) = self.last.take() {
            let _ = task.await;
        }
        Ok(())
    }

    fn read_aloud(&mut self, line: String, rl: &mut DefaultEditor) {
        let Some(guard) = self.trigger.try_fire() else {
            println!("Still speaking. Use /stop to interrupt.");
            return;
        };
        lock(&self.current).stop_requested = false;
        let _ = rl.add_history_entry(line.as_str());

        let narrator = self.narrator.clone();
        let speaker = self.settings.settings().speaker();
        let current = self.current.clone();
        let engine_url = self.engine_url.clone();
        self.last = Some(tokio::spawn(async move {
            match speak_guarded(narrator, guard, line, speaker, current).await {
                Ok(EndReason::Failed(reason)) => eprintln!("Playback failed: {reason}"),
                Ok(_) => {}
                Err(e) => eprintln!("{}", describe(&e, &engine_url)),
            }
        }));
    }

    fn stop_current(&self) {
        request_stop(&self.current, &self.trigger);
    }

    async fn print_speakers(&self) {
        match self.narrator.synthesizer().list_speakers().await {
            Ok(speakers) => println!("{}", format_speakers(&speakers)),
            Err(e) => eprintln!("{}", describe(&e, &self.engine_url)),
        }
    }
}

/// Speak one line while holding the trigger. The guard is dropped on every
/// exit path, so the trigger is usable again once this returns.
pub async fn speak_guarded(
    narrator: Narrator,
    guard: TriggerGuard,
    text: String,
    speaker: SpeakerId,
    current: CurrentPlayback,
) -> Result<EndReason, SpeakError> {
    let _guard = guard;
    let handle = narrator.speak(&text, &speaker).await?;
    {
        let mut in_flight = lock(&current);
        if in_flight.stop_requested {
            handle.stop();
        }
        in_flight.stopper = Some(handle.stopper());
    }
    let reason = handle.finished().await;
    lock(&current).stopper = None;
    Ok(reason)
}

/// Stop the line in flight, or mark it to be stopped once synthesis is done.
/// Does nothing when the trigger is idle.
fn request_stop(current: &CurrentPlayback, trigger: &Trigger) {
    let mut in_flight = lock(current);
    match &in_flight.stopper {
        Some(stopper) => stopper.stop(),
        None if !trigger.is_enabled() => in_flight.stop_requested = true,
        None => {}
    }
}

fn lock(current: &CurrentPlayback) -> MutexGuard<'_, InFlight> {
    current.lock().unwrap_or_else(|e| e.into_inner())
}

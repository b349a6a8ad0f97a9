//! Audio playback using cpal
//! Decodes the WAV payload and resamples it to the native device rate

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use rubato::{FftFixedIn, Resampler};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::{EndReason, PlaybackEnd, PlaybackError, PlaybackFacility, SourceId};
use crate::engine::types::AudioPayload;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Mono samples decoded from a payload.
struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
}

struct DeviceSource {
    audio: Arc<DecodedAudio>,
    stop: Arc<AtomicBool>,
}

/// Plays sources on the default output device. Each playback runs its
/// stream on a dedicated thread, since cpal streams are not `Send`.
pub struct DevicePlayback {
    next_id: AtomicU64,
    sources: Mutex<HashMap<SourceId, DeviceSource>>,
}

impl DevicePlayback {
    /// Fails if there is no output device to play on.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no output device available")?;
        info!(device = ?device.name().ok(), "using default output device");

        Ok(Self {
            next_id: AtomicU64::new(1),
            sources: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SourceId, DeviceSource>> {
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PlaybackFacility for DevicePlayback {
    fn load(&self, audio: AudioPayload) -> Result<SourceId, PlaybackError> {
        let decoded = decode_wav(audio.as_bytes())
            .map_err(|e| PlaybackError::InvalidAudio(format!("{e:#}")))?;
        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            source = %id,
            samples = decoded.samples.len(),
            sample_rate = decoded.sample_rate,
            "decoded audio source"
        );
        self.lock().insert(
            id,
            DeviceSource {
                audio: Arc::new(decoded),
                stop: Arc::new(AtomicBool::new(false)),
            },
        );
        Ok(id)
    }

    async fn play(&self, source: SourceId) -> Result<PlaybackEnd, PlaybackError> {
        let (audio, stop) = {
            let sources = self.lock();
            let entry = sources
                .get(&source)
                .ok_or(PlaybackError::UnknownSource(source))?;
            (entry.audio.clone(), entry.stop.clone())
        };

        let (started_tx, started_rx) = oneshot::channel();
        let (end_tx, end_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name(format!("yomiage-{source}"))
            .spawn(move || {
                let playback = match start_stream(&audio) {
                    Ok(playback) => playback,
                    Err(e) => {
                        let _ = started_tx.send(Err(format!("{e:#}")));
                        return;
                    }
                };
                let _ = started_tx.send(Ok(()));

                let reason = loop {
                    if stop.load(Ordering::SeqCst) {
                        break EndReason::Stopped;
                    }
                    if playback.is_finished() {
                        break EndReason::Finished;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                };
                drop(playback);
                let _ = end_tx.send(reason);
            })?;

        match started_rx.await {
            Ok(Ok(())) => {
                info!(source = %source, "playback started");
                Ok(end_rx)
            }
            Ok(Err(reason)) => Err(PlaybackError::Refused(reason)),
            Err(_) => Err(PlaybackError::Refused(
                "playback thread exited before starting".to_string(),
            )),
        }
    }

    fn stop(&self, source: SourceId) {
        if let Some(entry) = self.lock().get(&source) {
            entry.stop.store(true, Ordering::SeqCst);
        }
    }

    fn release(&self, source: SourceId) {
        self.lock().remove(&source);
    }
}

/// Running stream - dropping stops playback (RAII)
struct StreamPlayback {
    _stream: Stream,
    finished: Arc<AtomicBool>,
}

impl StreamPlayback {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

fn start_stream(audio: &DecodedAudio) -> Result<StreamPlayback> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no output device available")?;
    let supported_config = device
        .default_output_config()
        .context("failed to get default output config")?;

    let native_rate = supported_config.sample_rate().0;
    let native_channels = supported_config.channels() as usize;
    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();

    let resampled = if audio.sample_rate == native_rate {
        audio.samples.clone()
    } else {
        resample(&audio.samples, audio.sample_rate, native_rate)?
    };
    let samples = if native_channels > 1 {
        expand_to_channels(&resampled, native_channels)
    } else {
        resampled
    };

    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = match sample_format {
        SampleFormat::F32 => {
            build_stream::<f32>(&device, &config, samples, position, finished.clone())?
        }
        SampleFormat::I16 => {
            build_stream::<i16>(&device, &config, samples, position, finished.clone())?
        }
        format => anyhow::bail!("unsupported sample format: {:?}", format),
    };

    stream.play().context("failed to start playback stream")?;

    Ok(StreamPlayback {
        _stream: stream,
        finished,
    })
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    samples: Arc<Vec<f32>>,
    position: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32> + Default + Send + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let pos = position.load(Ordering::SeqCst);
                if pos >= samples.len() {
                    data.fill(T::default());
                    finished.store(true, Ordering::SeqCst);
                    return;
                }

                let end = (pos + data.len()).min(samples.len());
                let (audible, silent) = data.split_at_mut(end - pos);
                for (out, &sample) in audible.iter_mut().zip(&samples[pos..end]) {
                    *out = T::from_sample(sample);
                }
                silent.fill(T::default());
                position.store(end, Ordering::SeqCst);
            },
            move |err| {
                tracing::error!(error = ?err, "playback stream error");
            },
            None,
        )
        .context("failed to build output stream")
}

/// Decode a WAV container into mono f32 samples.
fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).context("not a WAV payload")?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .context("failed to read WAV samples")?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to read WAV samples")?,
    };

    let channels = spec.channels.max(1) as usize;
    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    Ok(DecodedAudio {
        samples: mono,
        sample_rate: spec.sample_rate,
    })
}

/// Resample mono audio, returning exactly `len * target / source` frames.
/// The FFT resampler lags its input, so zero chunks are fed past the end
/// until the delayed tail has come out, then the leading delay is cut.
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    const CHUNK_SIZE: usize = 1024;
    let mut resampler =
        FftFixedIn::<f32>::new(source_rate as usize, target_rate as usize, CHUNK_SIZE, 2, 1)
            .context("failed to create resampler")?;

    let expected =
        (samples.len() as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut pos = 0;
    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(samples.len());
        let mut chunk = samples[pos..end].to_vec();
        chunk.resize(needed, 0.0);
        pos = end;

        let input = vec![chunk];
        let resampled = resampler
            .process(&input, None)
            .map_err(|e| anyhow::anyhow!("resampling failed: {e:?}"))?;
        output.extend(resampled.into_iter().next().unwrap_or_default());
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

fn expand_to_channels(samples: &[f32], channels: usize) -> Vec<f32> {
    samples
        .iter()
        .flat_map(|&sample| std::iter::repeat(sample).take(channels))
        .collect()
}

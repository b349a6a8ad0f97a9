//! VOICEVOX engine client: `audio_query` followed by `synthesis`

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use super::provider::SpeechSynthesizer;
use super::types::{AudioPayload, Speaker, SpeakerId, SynthesisQuery, SynthesisRequest};
use crate::error::{Phase, SpeakError};

pub const DEFAULT_BASE_URL: &str = "http://localhost:50021";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    /// Applied to every request when set. The client imposes no limit itself.
    pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

/// Endpoint URLs resolved once against the configured base.
#[derive(Debug, Clone)]
struct Endpoints {
    audio_query: Url,
    synthesis: Url,
    speakers: Url,
}

impl Endpoints {
    fn resolve(base_url: &str) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("Invalid engine URL: {base_url}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let join = |phase: Phase| {
            base.join(phase.path())
                .with_context(|| format!("Failed to build {phase} URL from {base}"))
        };
        Ok(Self {
            audio_query: join(Phase::BuildQuery)?,
            synthesis: join(Phase::Synthesize)?,
            speakers: join(Phase::ListSpeakers)?,
        })
    }

    fn get(&self, phase: Phase) -> Url {
        match phase {
            Phase::BuildQuery => self.audio_query.clone(),
            Phase::Synthesize => self.synthesis.clone(),
            Phase::ListSpeakers => self.speakers.clone(),
        }
    }
}

pub struct SynthesisClient {
    config: EngineConfig,
    endpoints: Endpoints,
    client: Client,
}

impl SynthesisClient {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let endpoints = Endpoints::resolve(&config.base_url)?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            endpoints,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// POST `/audio_query`, returning the engine's query document.
    pub async fn build_query(
        &self,
        text: &str,
        speaker: &SpeakerId,
    ) -> Result<SynthesisQuery, SpeakError> {
        let phase = Phase::BuildQuery;
        debug!(phase = %phase, speaker = %speaker, chars = text.chars().count(), "requesting audio query");

        let response = self
            .client
            .post(self.endpoints.get(phase))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|source| SpeakError::Transport { phase, source })?;

        let response = check_status(phase, response)?;
        response
            .json::<SynthesisQuery>()
            .await
            .map_err(|source| SpeakError::Transport { phase, source })
    }

    /// POST `/synthesis` with `query` as the body, returning the audio bytes.
    pub async fn synthesize(
        &self,
        query: &SynthesisQuery,
        speaker: &SpeakerId,
    ) -> Result<AudioPayload, SpeakError> {
        let phase = Phase::Synthesize;
        debug!(phase = %phase, speaker = %speaker, "requesting synthesis");

        let response = self
            .client
            .post(self.endpoints.get(phase))
            .query(&[("speaker", speaker.as_str())])
            .json(query)
            .send()
            .await
            .map_err(|source| SpeakError::Transport { phase, source })?;

        let response = check_status(phase, response)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| SpeakError::Transport { phase, source })?;

        debug!(phase = %phase, bytes = bytes.len(), "received audio");
        Ok(AudioPayload::new(bytes.to_vec()))
    }
}

fn check_status(phase: Phase, response: Response) -> Result<Response, SpeakError> {
    let status = response.status();
    if !status.is_success() {
        warn!(phase = %phase, status = status.as_u16(), "engine returned error status");
        return Err(SpeakError::Upstream {
            phase,
            status: status.as_u16(),
        });
    }
    Ok(response)
}

#[async_trait]
impl SpeechSynthesizer for SynthesisClient {
    async fn synthesize_to_audio(
        &self,
        text: &str,
        speaker: &SpeakerId,
    ) -> Result<AudioPayload, SpeakError> {
        let request = SynthesisRequest::new(text, speaker.clone())?;
        let query = self.build_query(request.text(), request.speaker()).await?;
        self.synthesize(&query, request.speaker()).await
    }

    async fn list_speakers(&self) -> Result<Vec<Speaker>, SpeakError> {
        let phase = Phase::ListSpeakers;
        let response = self
            .client
            .get(self.endpoints.get(phase))
            .send()
            .await
            .map_err(|source| SpeakError::Transport { phase, source })?;

        let response = check_status(phase, response)?;
        response
            .json::<Vec<Speaker>>()
            .await
            .map_err(|source| SpeakError::Transport { phase, source })
    }
}

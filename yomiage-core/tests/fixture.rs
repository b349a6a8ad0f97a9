use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use yomiage_core::engine::types::AudioPayload;
use yomiage_core::playback::{EndReason, PlaybackEnd, PlaybackError, PlaybackFacility, SourceId};
use yomiage_core::{EngineConfig, SynthesisClient};

#[allow(dead_code)]
pub const SAMPLE_AUDIO: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt fake-voicevox-audio";

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[allow(dead_code)]
pub fn sample_query() -> serde_json::Value {
    json!({
        "accent_phrases": [{
            "moras": [{"text": "コ", "consonant": "k", "vowel": "o", "pitch": 5.5}],
            "accent": 5,
            "pause_mora": null,
            "is_interrogative": false
        }],
        "speedScale": 1.0,
        "pitchScale": 0.0,
        "intonationScale": 1.0,
        "volumeScale": 1.0,
        "prePhonemeLength": 0.1,
        "postPhonemeLength": 0.1,
        "outputSamplingRate": 24000,
        "outputStereo": false,
        "kana": "コンニチワ'"
    })
}

/// Poll `check` until it holds, failing the test after two seconds.
#[allow(dead_code)]
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    #[allow(dead_code)]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[allow(dead_code)]
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Reply {
    fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: serde_json::to_vec(&value).unwrap(),
        }
    }

    fn error(status: u16) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: br#"{"detail":"fake engine error"}"#.to_vec(),
        }
    }
}

struct EngineState {
    requests: Vec<RecordedRequest>,
    replies: HashMap<&'static str, Reply>,
}

/// Minimal HTTP/1.1 stand-in for a VOICEVOX engine. Records every request
/// and answers with scripted replies.
pub struct FakeEngine {
    addr: SocketAddr,
    state: Arc<Mutex<EngineState>>,
    server: JoinHandle<()>,
}

#[allow(dead_code)]
impl FakeEngine {
    pub async fn start() -> Self {
        init_tracing();

        let mut replies = HashMap::new();
        replies.insert("audio_query", Reply::json(sample_query()));
        replies.insert(
            "synthesis",
            Reply {
                status: 200,
                content_type: "audio/wav",
                body: SAMPLE_AUDIO.to_vec(),
            },
        );
        replies.insert(
            "speakers",
            Reply::json(json!([
                {
                    "name": "四国めたん",
                    "speaker_uuid": "7ffcb7ce-00ec-4bdc-82cd-45a8889e43ff",
                    "styles": [{"name": "ノーマル", "id": 2}, {"name": "あまあま", "id": 0}],
                    "version": "0.14.1"
                },
                {
                    "name": "ずんだもん",
                    "speaker_uuid": "388f246b-8c41-4ac1-8e2d-5d79f3ff56d9",
                    "styles": [{"name": "ノーマル", "id": 3}],
                    "version": "0.14.1"
                }
            ])),
        );

        let state = Arc::new(Mutex::new(EngineState {
            requests: Vec::new(),
            replies,
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_state = state.clone();
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = server_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> SynthesisClient {
        SynthesisClient::new(EngineConfig {
            base_url: self.base_url(),
            timeout: Some(Duration::from_secs(5)),
        })
        .unwrap()
    }

    pub fn fail(&self, path: &'static str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(path, Reply::error(status));
    }

    pub fn reply_json(&self, path: &'static str, value: serde_json::Value) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(path, Reply::json(value));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    state: Arc<Mutex<EngineState>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or("/").to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let url = reqwest::Url::parse(&format!("http://engine{target}")).unwrap();
    let path = url.path().trim_start_matches('/').to_string();
    let params = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let reply = {
        let mut state = state.lock().unwrap();
        let reply = state
            .replies
            .get(path.as_str())
            .cloned()
            .unwrap_or_else(|| Reply::error(404));
        state.requests.push(RecordedRequest {
            method,
            path,
            params,
            body,
        });
        reply
    };

    let head = format!(
        "HTTP/1.1 {} Fake\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        reply.status,
        reply.content_type,
        reply.body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&reply.body).await?;
    stream.shutdown().await
}

#[derive(Default)]
struct PlaybackState {
    next_id: u64,
    loaded: Vec<(SourceId, AudioPayload)>,
    playing: HashMap<SourceId, oneshot::Sender<EndReason>>,
    played: Vec<SourceId>,
    stopped: Vec<SourceId>,
    released: Vec<SourceId>,
    refuse: bool,
}

/// Playback facility that records every call and ends playback on demand.
#[derive(Clone, Default)]
pub struct FakePlayback {
    inner: Arc<Mutex<PlaybackState>>,
}

#[allow(dead_code)]
impl FakePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// A facility that refuses to start, like a blocked autoplay.
    pub fn refusing() -> Self {
        let playback = Self::default();
        playback.inner.lock().unwrap().refuse = true;
        playback
    }

    pub fn loaded(&self) -> Vec<(SourceId, AudioPayload)> {
        self.inner.lock().unwrap().loaded.clone()
    }

    pub fn played(&self) -> Vec<SourceId> {
        self.inner.lock().unwrap().played.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.inner.lock().unwrap().stopped.clone()
    }

    pub fn released(&self) -> Vec<SourceId> {
        self.inner.lock().unwrap().released.clone()
    }

    pub fn is_playing(&self, source: SourceId) -> bool {
        self.inner.lock().unwrap().playing.contains_key(&source)
    }

    /// Fire the end notification as if the audio ran to completion.
    pub fn finish(&self, source: SourceId) {
        let sender = self.inner.lock().unwrap().playing.remove(&source);
        sender
            .expect("source is not playing")
            .send(EndReason::Finished)
            .unwrap();
    }

    /// Drop the end notification without firing it.
    pub fn abandon(&self, source: SourceId) {
        self.inner.lock().unwrap().playing.remove(&source);
    }
}

#[async_trait]
impl PlaybackFacility for FakePlayback {
    fn load(&self, audio: AudioPayload) -> Result<SourceId, PlaybackError> {
        let mut state = self.inner.lock().unwrap();
        state.next_id += 1;
        let id = SourceId(state.next_id);
        state.loaded.push((id, audio));
        Ok(id)
    }

    async fn play(&self, source: SourceId) -> Result<PlaybackEnd, PlaybackError> {
        let mut state = self.inner.lock().unwrap();
        if state.refuse {
            return Err(PlaybackError::Refused(
                "play() failed because the user didn't interact with the document first"
                    .to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        state.playing.insert(source, tx);
        state.played.push(source);
        Ok(rx)
    }

    fn stop(&self, source: SourceId) {
        let mut state = self.inner.lock().unwrap();
        state.stopped.push(source);
        if let Some(tx) = state.playing.remove(&source) {
            let _ = tx.send(EndReason::Stopped);
        }
    }

    fn release(&self, source: SourceId) {
        let mut state = self.inner.lock().unwrap();
        state.released.push(source);
        state.playing.remove(&source);
    }
}

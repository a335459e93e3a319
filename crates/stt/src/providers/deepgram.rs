//! A Deepgram-class streaming transcription provider (spec §6.2).
//!
//! Speaks Deepgram's `/listen` websocket protocol: PCM16 binary frames
//! in, incremental JSON transcript frames out. Any streaming STT vendor
//! with a similar "binary audio in, JSON transcript out" websocket shape
//! can be adapted the same way.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{BoxStream, SplitSink};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use voice_agent_core::{classify_status, ClassifiedError, ErrorKind, Pcm16Audio, SessionId, StreamingTranscriber, TranscriptEvent};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub connect_timeout: Duration,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            model: "nova-2".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramFrame {
    #[serde(default)]
    channel: Option<DeepgramChannel>,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    start: f64,
}

/// Opens one persistent websocket per session; holds the write half so
/// `forward_chunk` can push audio independently of the read-side stream
/// returned by `start_session`.
pub struct DeepgramProvider {
    config: DeepgramConfig,
    sinks: DashMap<SessionId, Arc<Mutex<WsSink>>>,
}

impl DeepgramProvider {
    pub fn new(config: DeepgramConfig) -> Self {
        Self { config, sinks: DashMap::new() }
    }

    fn url(&self, language: &str) -> String {
        format!(
            "{}?model={}&language={}&encoding=linear16&sample_rate=16000&channels=1&interim_results=true",
            self.config.endpoint, self.config.model, language
        )
    }
}

#[async_trait]
impl StreamingTranscriber for DeepgramProvider {
    async fn start_session(
        &self,
        session_id: SessionId,
        language: &str,
    ) -> Result<BoxStream<'static, Result<TranscriptEvent, ClassifiedError>>, ClassifiedError> {
        let mut request = self
            .url(language)
            .into_client_request()
            .map_err(|e| ClassifiedError::new(ErrorKind::Fatal, e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.config.api_key)
                .parse()
                .map_err(|_| ClassifiedError::new(ErrorKind::Auth, "invalid api key header".to_string()))?,
        );

        let connect = tokio::time::timeout(self.config.connect_timeout, tokio_tungstenite::connect_async(request)).await;
        let (stream, response) = match connect {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => return Err(classify_connect_error(&e)),
            Err(_) => return Err(ClassifiedError::new(ErrorKind::Timeout, "deepgram connect timed out".to_string())),
        };
        if response.status().as_u16() >= 400 {
            return Err(classify_status(response.status().as_u16(), None));
        }

        let (sink, mut read) = stream.split();
        self.sinks.insert(session_id, Arc::new(Mutex::new(sink)));

        let event_stream = async_stream::stream! {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let parsed: Result<DeepgramFrame, _> = serde_json::from_str(&text);
                        match parsed {
                            Ok(frame) => {
                                let Some(channel) = frame.channel else { continue };
                                let Some(alt) = channel.alternatives.into_iter().next() else { continue };
                                if alt.transcript.is_empty() {
                                    continue;
                                }
                                yield Ok(TranscriptEvent {
                                    text: alt.transcript,
                                    confidence: alt.confidence,
                                    is_final: frame.is_final,
                                    timestamp_ms: (frame.start * 1000.0) as u64,
                                });
                            }
                            Err(e) => yield Err(ClassifiedError::new(ErrorKind::Network, e.to_string())),
                        }
                    }
                    Ok(Message::Close(_)) => return,
                    Ok(_) => continue,
                    Err(e) => {
                        yield Err(classify_connect_error(&e));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(event_stream))
    }

    async fn forward_chunk(&self, session_id: SessionId, audio: &Pcm16Audio) -> Result<(), ClassifiedError> {
        let sink = self
            .sinks
            .get(&session_id)
            .ok_or_else(|| ClassifiedError::new(ErrorKind::Fatal, "no deepgram connection for session".to_string()))?
            .clone();
        let mut sink = sink.lock().await;
        sink.send(Message::Binary(audio.samples.clone()))
            .await
            .map_err(|e| classify_connect_error(&e))
    }

    async fn end_session(&self, session_id: SessionId) -> Result<(), ClassifiedError> {
        if let Some((_, sink)) = self.sinks.remove(&session_id) {
            let mut sink = sink.lock().await;
            let _ = sink.send(Message::Text(r#"{"type":"CloseStream"}"#.to_string())).await;
            let _ = sink.close().await;
        }
        Ok(())
    }
}

fn classify_connect_error(e: &tokio_tungstenite::tungstenite::Error) -> ClassifiedError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match e {
        WsError::Http(resp) => classify_status(resp.status().as_u16(), None),
        WsError::Io(_) | WsError::ConnectionClosed | WsError::AlreadyClosed => {
            ClassifiedError::new(ErrorKind::Network, e.to_string())
        }
        _ => ClassifiedError::new(ErrorKind::Fatal, e.to_string()),
    }
}

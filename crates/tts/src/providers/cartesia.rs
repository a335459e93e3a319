//! A Cartesia-class streaming synthesis provider (spec §6.2).
//!
//! One websocket connection per session; each `synthesize` call sends a
//! request tagged with its `context_id` (the utterance id) and reads
//! back base64-encoded PCM16 chunks tagged with the same id until the
//! provider marks that context done.

use async_trait::async_trait;
use base64::engine::{general_purpose::STANDARD, Engine};
use dashmap::DashMap;
use futures::stream::{BoxStream, SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use voice_agent_core::{classify_status, ClassifiedError, ErrorKind, Pcm16Audio, SampleRate, SessionId, StreamingSynthesizer, UtteranceId};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct CartesiaConfig {
    pub api_key: String,
    pub endpoint: String,
    pub voice_id: String,
    pub model: String,
    pub output_sample_rate: SampleRate,
    pub connect_timeout: Duration,
}

impl Default for CartesiaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "wss://api.cartesia.ai/tts/websocket".to_string(),
            voice_id: "default".to_string(),
            model: "sonic".to_string(),
            output_sample_rate: SampleRate::Hz48000,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: VoiceSelector<'a>,
    output_format: OutputFormat,
    context_id: String,
}

#[derive(Debug, Serialize)]
struct VoiceSelector<'a> {
    mode: &'a str,
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct OutputFormat {
    container: &'static str,
    encoding: &'static str,
    sample_rate: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CartesiaFrame {
    Chunk { context_id: String, data: String },
    Done { context_id: String },
    Error { context_id: String, error: String },
}

struct Connection {
    sink: Mutex<SplitSink<Socket, Message>>,
    read: Mutex<SplitStream<Socket>>,
}

pub struct CartesiaProvider {
    config: CartesiaConfig,
    connections: DashMap<SessionId, Arc<Connection>>,
}

impl CartesiaProvider {
    pub fn new(config: CartesiaConfig) -> Self {
        Self { config, connections: DashMap::new() }
    }

    fn url(&self) -> String {
        format!("{}?api_key={}&cartesia_version=2024-06-10", self.config.endpoint, self.config.api_key)
    }
}

#[async_trait]
impl StreamingSynthesizer for CartesiaProvider {
    async fn connect(&self, session_id: SessionId) -> Result<(), ClassifiedError> {
        if self.connections.contains_key(&session_id) {
            return Ok(());
        }
        let request = self
            .url()
            .into_client_request()
            .map_err(|e| ClassifiedError::new(ErrorKind::Fatal, e.to_string()))?;

        let connect = tokio::time::timeout(self.config.connect_timeout, tokio_tungstenite::connect_async(request)).await;
        let (stream, response) = match connect {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => return Err(classify_connect_error(&e)),
            Err(_) => return Err(ClassifiedError::new(ErrorKind::Timeout, "cartesia connect timed out".to_string())),
        };
        if response.status().as_u16() >= 400 {
            return Err(classify_status(response.status().as_u16(), None));
        }

        let (sink, read) = stream.split();
        self.connections
            .insert(session_id, Arc::new(Connection { sink: Mutex::new(sink), read: Mutex::new(read) }));
        Ok(())
    }

    async fn synthesize(
        &self,
        session_id: SessionId,
        utterance_id: UtteranceId,
        text: &str,
    ) -> Result<BoxStream<'static, Result<Pcm16Audio, ClassifiedError>>, ClassifiedError> {
        let conn = self
            .connections
            .get(&session_id)
            .ok_or_else(|| ClassifiedError::new(ErrorKind::Fatal, "no cartesia connection for session".to_string()))?
            .clone();

        let context_id = utterance_id.to_string();
        let request = SynthesizeRequest {
            model_id: &self.config.model,
            transcript: text,
            voice: VoiceSelector { mode: "id", id: &self.config.voice_id },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_s16le",
                sample_rate: self.config.output_sample_rate.hz(),
            },
            context_id: context_id.clone(),
        };
        let payload = serde_json::to_string(&request)
            .map_err(|e| ClassifiedError::new(ErrorKind::Fatal, format!("failed to encode request: {e}")))?;

        conn.sink
            .lock()
            .await
            .send(Message::Text(payload))
            .await
            .map_err(|e| classify_connect_error(&e))?;

        let output_rate = self.config.output_sample_rate;
        let audio_stream = async_stream::stream! {
            loop {
                let mut read = conn.read.lock().await;
                let msg = read.next().await;
                drop(read);
                let Some(msg) = msg else { return };
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<CartesiaFrame>(&text) {
                            Ok(CartesiaFrame::Chunk { context_id: cid, data }) if cid == context_id => {
                                match STANDARD.decode(&data) {
                                    Ok(samples) => yield Ok(Pcm16Audio::new(output_rate, samples)),
                                    Err(e) => {
                                        yield Err(ClassifiedError::new(ErrorKind::Network, e.to_string()));
                                        return;
                                    }
                                }
                            }
                            Ok(CartesiaFrame::Done { context_id: cid }) if cid == context_id => return,
                            Ok(CartesiaFrame::Error { context_id: cid, error }) if cid == context_id => {
                                yield Err(ClassifiedError::new(ErrorKind::Transient, error));
                                return;
                            }
                            Ok(_) => continue,
                            Err(e) => {
                                yield Err(ClassifiedError::new(ErrorKind::Network, e.to_string()));
                                return;
                            }
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

        Ok(Box::pin(audio_stream))
    }

    async fn disconnect(&self, session_id: SessionId) -> Result<(), ClassifiedError> {
        if let Some((_, conn)) = self.connections.remove(&session_id) {
            let _ = conn.sink.lock().await.close().await;
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

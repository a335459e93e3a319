//! An Ollama-compatible chat-completion provider (spec §6.2).
//!
//! Speaks the same `/api/chat` NDJSON streaming protocol as a local
//! Ollama install; any OpenAI-/Ollama-shaped upstream can be adapted the
//! same way.

use crate::error::LlmError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use voice_agent_core::{ChatDelta, ChatMessage, ChatRole, ClassifiedError, StreamingChatCompletion};

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "llama3:8b-instruct".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    options: WireOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        let role = match m.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        Self { role: role.to_string(), content: m.content.clone() }
    }
}

#[derive(Debug, Serialize)]
struct WireOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    message: WireMessage,
    done: bool,
}

#[async_trait]
impl StreamingChatCompletion for OllamaProvider {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<futures::stream::BoxStream<'static, Result<ChatDelta, ClassifiedError>>, ClassifiedError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            stream: true,
            options: WireOptions { temperature, num_predict: max_tokens },
        };

        let mut builder = self.client.post(self.api_url("/chat")).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| LlmError::from(e).into())?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(voice_agent_core::classify_status(status, retry_after));
        }

        let byte_stream = response.bytes_stream();
        let delta_stream = async_stream::stream! {
            let mut buf = String::new();
            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(LlmError::from(e).into());
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].to_string();
                    buf.drain(..=pos);
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<StreamChunk>(&line) {
                        Ok(parsed) => {
                            let is_final = parsed.done;
                            yield Ok(ChatDelta { text: parsed.message.content, is_final });
                            if is_final {
                                return;
                            }
                        }
                        Err(e) => {
                            yield Err(LlmError::InvalidResponse(e.to_string()).into());
                            return;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(delta_stream))
    }

    fn classify_error(&self, raw: &str) -> ClassifiedError {
        voice_agent_core::ClassifiedError::new(voice_agent_core::ErrorKind::Network, raw.to_string())
    }
}

//! Streaming chat-completion provider contract (spec §4.6, §6.2).

use crate::error::ClassifiedError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// One token (or token-group) delta from a chat-completion stream.
#[derive(Debug, Clone)]
pub struct ChatDelta {
    pub text: String,
    pub is_final: bool,
}

/// An upstream LLM chat-completion provider. One tier in the LLM Engine's
/// fallback chain (spec §4.6.3).
#[async_trait]
pub trait StreamingChatCompletion: Send + Sync {
    fn name(&self) -> &str;

    async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<BoxStream<'static, Result<ChatDelta, ClassifiedError>>, ClassifiedError>;

    fn classify_error(&self, raw: &str) -> ClassifiedError {
        ClassifiedError::new(crate::error::ErrorKind::Network, raw.to_string())
    }
}

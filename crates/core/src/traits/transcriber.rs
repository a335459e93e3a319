//! Streaming speech-to-text provider contract (spec §4.4, §6.2).

use crate::audio::Pcm16Audio;
use crate::error::ClassifiedError;
use crate::ids::SessionId;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// One unit of transcription output, interim or final (spec §4.4.3).
#[derive(Debug, Clone)]
pub struct TranscriptEvent {
    pub text: String,
    pub confidence: f32,
    pub is_final: bool,
    pub timestamp_ms: u64,
}

/// An upstream speech-to-text provider. Implementations own their own
/// connection lifecycle; the STT engine crate drives retries around it.
#[async_trait]
pub trait StreamingTranscriber: Send + Sync {
    /// Open a provider session and return a stream of transcript events.
    /// The stream ends when the provider closes the connection or
    /// `end_session` is called.
    async fn start_session(
        &self,
        session_id: SessionId,
        language: &str,
    ) -> Result<BoxStream<'static, Result<TranscriptEvent, ClassifiedError>>, ClassifiedError>;

    /// Forward one chunk of PCM16 audio to an open session.
    async fn forward_chunk(&self, session_id: SessionId, audio: &Pcm16Audio) -> Result<(), ClassifiedError>;

    /// Signal end-of-audio; the provider should flush and emit a final
    /// transcript before closing.
    async fn end_session(&self, session_id: SessionId) -> Result<(), ClassifiedError>;

    /// Classify a raw provider error into the shared taxonomy (spec §6.2,
    /// §7). The default simply treats everything as network-transient;
    /// providers with richer status information should override this.
    fn classify_error(&self, raw: &str) -> ClassifiedError {
        ClassifiedError::new(crate::error::ErrorKind::Network, raw.to_string())
    }
}

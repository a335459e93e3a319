//! Streaming text-to-speech provider contract (spec §4.5, §6.2).

use crate::audio::Pcm16Audio;
use crate::error::ClassifiedError;
use crate::ids::{SessionId, UtteranceId};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// An upstream text-to-speech provider. The TTS engine crate owns the
/// state machine, mutex, and listener bookkeeping around this trait; the
/// provider only speaks audio in, audio out.
#[async_trait]
pub trait StreamingSynthesizer: Send + Sync {
    /// Open (or reuse) a provider connection for `session_id`.
    async fn connect(&self, session_id: SessionId) -> Result<(), ClassifiedError>;

    /// Submit one chunk of text and return a stream of synthesized audio.
    /// Ends when the provider finishes the utterance.
    async fn synthesize(
        &self,
        session_id: SessionId,
        utterance_id: UtteranceId,
        text: &str,
    ) -> Result<BoxStream<'static, Result<Pcm16Audio, ClassifiedError>>, ClassifiedError>;

    /// Tear down the provider connection for `session_id`.
    async fn disconnect(&self, session_id: SessionId) -> Result<(), ClassifiedError>;

    fn classify_error(&self, raw: &str) -> ClassifiedError {
        ClassifiedError::new(crate::error::ErrorKind::Network, raw.to_string())
    }
}

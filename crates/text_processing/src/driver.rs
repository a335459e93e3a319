//! Drives an LLM token stream through the [`SemanticChunker`] and into a
//! synthesize callback, one chunk at a time, awaiting each chunk's
//! completion before submitting the next (spec §4.7.3).

use crate::chunker::{ChunkerConfig, SemanticChunker};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use voice_agent_core::{ChatDelta, ClassifiedError};

/// Synthesizes one text chunk through the TTS Engine, resolving once
/// that utterance's `audio.output.complete` has been observed.
pub type ChunkSynthesizer =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<(), ClassifiedError>> + Send + Sync>;

/// Consumes `token_stream` to completion, returning the full
/// concatenated response text. Each chunk is awaited sequentially; no
/// two chunks are ever in flight at once.
pub async fn drive_stream(
    mut token_stream: BoxStream<'static, Result<ChatDelta, ClassifiedError>>,
    config: ChunkerConfig,
    synthesize: ChunkSynthesizer,
) -> Result<String, ClassifiedError> {
    let mut chunker = SemanticChunker::new(config);
    let mut full_text = String::new();

    while let Some(delta) = token_stream.next().await {
        let delta = delta?;
        full_text.push_str(&delta.text);
        for chunk in chunker.push(&delta.text) {
            synthesize(chunk).await?;
        }
        if delta.is_final {
            break;
        }
    }

    if let Some(remainder) = chunker.finish() {
        synthesize(remainder).await?;
    }

    Ok(full_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;
    use voice_agent_core::ErrorKind;

    fn recording_synthesizer() -> (ChunkSynthesizer, Arc<AsyncMutex<Vec<String>>>) {
        let calls = Arc::new(AsyncMutex::new(Vec::new()));
        let recorded = calls.clone();
        let synth: ChunkSynthesizer = Arc::new(move |text| {
            let calls = recorded.clone();
            Box::pin(async move {
                calls.lock().await.push(text);
                Ok(())
            })
        });
        (synth, calls)
    }

    #[tokio::test]
    async fn dispatches_chunks_in_order_and_returns_full_text() {
        let deltas = vec![
            Ok(ChatDelta { text: "Hi! ||BREAK|| How can ".to_string(), is_final: false }),
            Ok(ChatDelta { text: "I help?".to_string(), is_final: true }),
        ];
        let stream: BoxStream<'static, Result<ChatDelta, ClassifiedError>> =
            Box::pin(futures::stream::iter(deltas));
        let (synth, calls) = recording_synthesizer();

        let full = drive_stream(stream, ChunkerConfig::default(), synth).await.unwrap();

        assert_eq!(full, "Hi! ||BREAK|| How can I help?");
        let seen = calls.lock().await.clone();
        assert_eq!(seen, vec!["Hi!".to_string(), "How can I help?".to_string()]);
    }

    #[tokio::test]
    async fn propagates_upstream_error() {
        let deltas = vec![Err(ClassifiedError::new(ErrorKind::Network, "upstream closed"))];
        let stream: BoxStream<'static, Result<ChatDelta, ClassifiedError>> =
            Box::pin(futures::stream::iter(deltas));
        let (synth, _calls) = recording_synthesizer();

        let result = drive_stream(stream, ChunkerConfig::default(), synth).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn no_marker_dispatches_single_chunk_at_stream_end() {
        let deltas = vec![Ok(ChatDelta { text: "just one sentence".to_string(), is_final: true })];
        let stream: BoxStream<'static, Result<ChatDelta, ClassifiedError>> =
            Box::pin(futures::stream::iter(deltas));
        let (synth, calls) = recording_synthesizer();

        drive_stream(stream, ChunkerConfig::default(), synth).await.unwrap();
        assert_eq!(*calls.lock().await, vec!["just one sentence".to_string()]);
    }
}

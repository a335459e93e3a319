//! The LLM Engine: per-session history, streaming completion, tiered
//! fallback (spec §4.6).

use crate::context::LlmContext;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use voice_agent_core::{ChatDelta, ClassifiedError, SessionId, StreamingChatCompletion};

/// Consumes the raw token stream (handing it to the Semantic Chunker,
/// which drives the TTS Engine chunk by chunk) and returns the full
/// concatenated assistant response once the stream completes.
pub type TokenStreamSink = Arc<
    dyn Fn(
            SessionId,
            futures::stream::BoxStream<'static, Result<ChatDelta, ClassifiedError>>,
        ) -> BoxFuture<'static, Result<String, ClassifiedError>>
        + Send
        + Sync,
>;

/// Sends fallback text straight to the TTS Engine, bypassing the chunker
/// (spec §4.6.3).
pub type FallbackSink = Arc<dyn Fn(SessionId, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoked when the fallback tier reaches n >= 3: a graceful-exit signal
/// the orchestrator may act on by ending the session.
pub type GracefulExitSignal = Arc<dyn Fn(SessionId) -> BoxFuture<'static, ()> + Send + Sync>;

pub fn fallback_text(failure_count: u32) -> &'static str {
    match failure_count {
        1 => "I apologize, can you repeat that?",
        2 => "I'm experiencing technical difficulties. Please hold.",
        _ => "I apologize, I'm having connection issues. I'll have someone call you back.",
    }
}

pub struct LlmEngine {
    provider: Arc<dyn StreamingChatCompletion>,
    contexts: DashMap<SessionId, Arc<Mutex<LlmContext>>>,
    token_sink: TokenStreamSink,
    fallback_sink: FallbackSink,
    graceful_exit: GracefulExitSignal,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn StreamingChatCompletion>,
        token_sink: TokenStreamSink,
        fallback_sink: FallbackSink,
        graceful_exit: GracefulExitSignal,
        system_prompt: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            contexts: DashMap::new(),
            token_sink,
            fallback_sink,
            graceful_exit,
            system_prompt: system_prompt.into(),
            temperature,
            max_tokens,
        })
    }

    fn context_for(&self, session_id: SessionId) -> Arc<Mutex<LlmContext>> {
        self.contexts
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(LlmContext::new(self.system_prompt.clone()))))
            .clone()
    }

    pub fn remove_session(&self, session_id: SessionId) {
        self.contexts.remove(&session_id);
    }

    /// Asynchronous; never rejects on queue size, always enqueues (spec
    /// §4.6.1).
    pub fn generate_response(self: &Arc<Self>, session_id: SessionId, user_message: String) {
        let context = self.context_for(session_id);
        let start_now = {
            let mut ctx = context.lock();
            ctx.push_user(user_message);
            ctx.enqueue_turn()
        };

        if start_now {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.drive(session_id, context).await;
            });
        }
    }

    async fn drive(self: Arc<Self>, session_id: SessionId, context: Arc<Mutex<LlmContext>>) {
        loop {
            let history = context.lock().history();

            match self.provider.stream_completion(&history, self.temperature, self.max_tokens).await {
                Ok(stream) => match (self.token_sink)(session_id, stream).await {
                    Ok(full_text) => {
                        let mut ctx = context.lock();
                        ctx.append_assistant(full_text);
                        ctx.on_success();
                    }
                    Err(err) => self.handle_failure(session_id, &context, err).await,
                },
                Err(err) => self.handle_failure(session_id, &context, err).await,
            }

            let should_continue = context.lock().finish_turn_and_check_next();
            if !should_continue {
                break;
            }
        }
    }

    async fn handle_failure(&self, session_id: SessionId, context: &Arc<Mutex<LlmContext>>, err: ClassifiedError) {
        tracing::warn!(%session_id, %err, "llm: streaming failure");
        metrics::counter!("llm_generation_failures_total").increment(1);

        let n = {
            let mut ctx = context.lock();
            ctx.on_failure()
        };
        let text = fallback_text(n).to_string();
        context.lock().append_assistant(text.clone());

        (self.fallback_sink)(session_id, text).await;

        if n >= 3 {
            (self.graceful_exit)(session_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;
    use voice_agent_core::{ChatMessage, ErrorKind};

    struct AlwaysFailsProvider;

    #[async_trait]
    impl StreamingChatCompletion for AlwaysFailsProvider {
        fn name(&self) -> &str {
            "always-fails"
        }
        async fn stream_completion(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<futures::stream::BoxStream<'static, Result<ChatDelta, ClassifiedError>>, ClassifiedError>
        {
            Err(ClassifiedError::new(ErrorKind::Transient, "upstream down"))
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl StreamingChatCompletion for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn stream_completion(
            &self,
            messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<futures::stream::BoxStream<'static, Result<ChatDelta, ClassifiedError>>, ClassifiedError>
        {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let stream = futures::stream::iter(vec![Ok(ChatDelta { text: last, is_final: true })]);
            Ok(Box::pin(stream))
        }
    }

    fn collecting_token_sink() -> TokenStreamSink {
        Arc::new(|_id, mut stream| {
            Box::pin(async move {
                use futures::StreamExt;
                let mut out = String::new();
                while let Some(delta) = stream.next().await {
                    out.push_str(&delta?.text);
                }
                Ok(out)
            })
        })
    }

    fn no_op_fallback_sink(calls: Arc<AsyncMutex<Vec<String>>>) -> FallbackSink {
        Arc::new(move |_id, text| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.lock().await.push(text);
            })
        })
    }

    fn exit_counter(count: Arc<AtomicUsize>) -> GracefulExitSignal {
        Arc::new(move |_id| {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn successful_turn_appends_assistant_and_resets_failures() {
        let fallback_calls = Arc::new(AsyncMutex::new(Vec::new()));
        let exits = Arc::new(AtomicUsize::new(0));
        let engine = LlmEngine::new(
            Arc::new(EchoProvider),
            collecting_token_sink(),
            no_op_fallback_sink(fallback_calls.clone()),
            exit_counter(exits.clone()),
            "system prompt",
            0.7,
            500,
        );

        let session_id = SessionId::new();
        engine.generate_response(session_id, "hello".to_string());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(fallback_calls.lock().await.is_empty());
        assert_eq!(exits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn three_consecutive_failures_trigger_graceful_exit() {
        let fallback_calls = Arc::new(AsyncMutex::new(Vec::new()));
        let exits = Arc::new(AtomicUsize::new(0));
        let engine = LlmEngine::new(
            Arc::new(AlwaysFailsProvider),
            collecting_token_sink(),
            no_op_fallback_sink(fallback_calls.clone()),
            exit_counter(exits.clone()),
            "system prompt",
            0.7,
            500,
        );

        let session_id = SessionId::new();
        for _ in 0..3 {
            engine.generate_response(session_id, "hi".to_string());
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let calls = fallback_calls.lock().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], "I apologize, can you repeat that?");
        assert_eq!(calls[2], "I apologize, I'm having connection issues. I'll have someone call you back.");
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queued_turns_while_processing_drain_in_fifo_order() {
        let fallback_calls = Arc::new(AsyncMutex::new(Vec::new()));
        let exits = Arc::new(AtomicUsize::new(0));
        let engine = LlmEngine::new(
            Arc::new(EchoProvider),
            collecting_token_sink(),
            no_op_fallback_sink(fallback_calls),
            exit_counter(exits),
            "system prompt",
            0.7,
            500,
        );

        let session_id = SessionId::new();
        engine.generate_response(session_id, "first".to_string());
        engine.generate_response(session_id, "second".to_string());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let context = engine.context_for(session_id);
        let entries = context.lock().entries().to_vec();
        let contents: Vec<String> = entries.iter().map(|e| e.message.content.clone()).collect();
        assert!(contents.contains(&"first".to_string()));
        assert!(contents.contains(&"second".to_string()));
    }
}

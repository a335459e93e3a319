//! The STT Engine: upstream connection lifecycle, retry, transcript
//! fan-out (spec §4.4).

use crate::error::SttError;
use crate::session::{SttConnectionState, SttSession};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use voice_agent_core::{
    retry_with_schedule, ClassifiedError, Pcm16Audio, RetrySchedule, SessionId,
    StreamingTranscriber, TranscriptEvent,
};

/// Invoked for every interim/final transcript event so the orchestrator
/// can forward `transcript.interim`/`transcript.final` frames to the
/// client.
pub type TranscriptSink = Arc<dyn Fn(SessionId, TranscriptEvent) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct SttEngine {
    provider: Arc<dyn StreamingTranscriber>,
    sessions: DashMap<SessionId, Arc<SttSession>>,
    /// One unbounded channel per session feeding a single writer task, so
    /// chunks reach the upstream transcriber strictly in submission order
    /// (spec §5) rather than racing across a fresh task per chunk.
    chunk_senders: DashMap<SessionId, mpsc::UnboundedSender<Pcm16Audio>>,
    sink: TranscriptSink,
}

impl SttEngine {
    pub fn new(provider: Arc<dyn StreamingTranscriber>, sink: TranscriptSink) -> Arc<Self> {
        Arc::new(Self { provider, sessions: DashMap::new(), chunk_senders: DashMap::new(), sink })
    }

    /// Establish the upstream connection, retrying on the hybrid schedule
    /// (spec §4.4.2). Fails fast (no retry) on auth/fatal classes.
    pub async fn create_session(
        self: &Arc<Self>,
        session_id: SessionId,
        language: String,
    ) -> Result<(), SttError> {
        let session = Arc::new(SttSession::new(language.clone()));
        self.sessions.insert(session_id, session.clone());

        let provider = self.provider.clone();
        let lang = language.clone();
        let schedule = RetrySchedule::hybrid();
        let outcome = retry_with_schedule(&schedule, {
            let provider = provider.clone();
            let lang = lang.clone();
            move || {
                let provider = provider.clone();
                let lang = lang.clone();
                async move { provider.start_session(session_id, &lang).await }
            }
        })
        .await;

        match outcome {
            Ok(result) => {
                *session.state.write() = SttConnectionState::Connected;
                self.spawn_chunk_writer(session_id);
                self.spawn_consumer(session_id, session.clone(), result.value);
                Ok(())
            }
            Err(err) => {
                *session.state.write() = SttConnectionState::Error;
                self.sessions.remove(&session_id);
                tracing::warn!(%session_id, error = %err, "stt createSession exhausted retries");
                Err(SttError::Provider(err))
            }
        }
    }

    /// One writer task per session draining chunks off an unbounded
    /// channel and forwarding them to the provider one at a time, so
    /// ordering survives even though `forward_chunk` itself is called
    /// from arbitrary caller tasks.
    fn spawn_chunk_writer(self: &Arc<Self>, session_id: SessionId) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Pcm16Audio>();
        self.chunk_senders.insert(session_id, tx);

        let provider = self.provider.clone();
        tokio::spawn(async move {
            while let Some(audio) = rx.recv().await {
                if let Err(err) = provider.forward_chunk(session_id, &audio).await {
                    tracing::warn!(%session_id, %err, "stt: forward_chunk failed");
                }
            }
        });
    }

    fn spawn_consumer(
        self: &Arc<Self>,
        session_id: SessionId,
        session: Arc<SttSession>,
        mut stream: futures::stream::BoxStream<'static, Result<TranscriptEvent, ClassifiedError>>,
    ) {
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(event)) => {
                        if event.is_final {
                            session.append_final(&event.text);
                        } else {
                            session.set_interim(&event.text);
                        }
                        session.metrics.write().transcripts_received += 1;
                        metrics::counter!("stt_transcripts_received_total").increment(1);
                        (engine.sink)(session_id, event).await;
                    }
                    Some(Err(err)) => {
                        session.metrics.write().errors += 1;
                        if !engine.try_reconnect(session_id, &session, &mut stream).await {
                            tracing::error!(%session_id, %err, "stt: mid-stream reconnect exhausted");
                            break;
                        }
                    }
                    None => {
                        // Upstream closed the stream without an explicit
                        // error; attempt the same reconnect path.
                        if !engine.try_reconnect(session_id, &session, &mut stream).await {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Mid-stream disconnect handling: fast schedule, drop audio arriving
    /// meanwhile (spec §4.4.2).
    async fn try_reconnect(
        &self,
        session_id: SessionId,
        session: &Arc<SttSession>,
        stream: &mut futures::stream::BoxStream<'static, Result<TranscriptEvent, ClassifiedError>>,
    ) -> bool {
        *session.state.write() = SttConnectionState::Reconnecting;
        let provider = self.provider.clone();
        let schedule = RetrySchedule::fast();

        let language = session.language.clone();
        let outcome = retry_with_schedule(&schedule, {
            let provider = provider.clone();
            let language = language.clone();
            move || {
                let provider = provider.clone();
                let language = language.clone();
                async move { provider.start_session(session_id, &language).await }
            }
        })
        .await;

        match outcome {
            Ok(result) => {
                *stream = result.value;
                *session.state.write() = SttConnectionState::Connected;
                session.metrics.write().reconnections += 1;
                metrics::counter!("stt_reconnections_total").increment(1);
                *session.reconnect_attempts.write() += result.attempts as u32;
                true
            }
            Err(_) => {
                *session.state.write() = SttConnectionState::Error;
                metrics::counter!("stt_reconnect_exhausted_total").increment(1);
                false
            }
        }
    }

    /// Forward one chunk of audio. Non-blocking from the caller's
    /// perspective: silently dropped while RECONNECTING or ERROR (spec
    /// §4.4.1).
    pub fn forward_chunk(self: &Arc<Self>, session_id: SessionId, audio: Pcm16Audio) {
        let Some(session) = self.sessions.get(&session_id).map(|e| e.value().clone()) else {
            return;
        };
        let state = *session.state.read();
        if state != SttConnectionState::Connected {
            tracing::warn!(%session_id, ?state, "stt: dropping chunk, connection not ready");
            return;
        }

        let Some(tx) = self.chunk_senders.get(&session_id).map(|e| e.value().clone()) else {
            return;
        };
        session.metrics.write().chunks_forwarded += 1;
        metrics::counter!("stt_chunks_forwarded_total").increment(1);
        if tx.send(audio).is_err() {
            tracing::warn!(%session_id, "stt: chunk writer task is gone, dropping chunk");
        }
    }

    /// Finalize the upstream connection and return the accumulated
    /// transcript, or an empty string on failure (spec §4.4.1: graceful
    /// degradation).
    pub async fn end_session(self: &Arc<Self>, session_id: SessionId) -> String {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return String::new();
        };
        self.chunk_senders.remove(&session_id);

        if let Err(err) = self.provider.end_session(session_id).await {
            tracing::warn!(%session_id, %err, "stt: endSession upstream call failed");
            return String::new();
        }

        session.take_accumulated()
    }

    pub fn connection_state(&self, session_id: SessionId) -> Option<SttConnectionState> {
        self.sessions.get(&session_id).map(|e| *e.value().state.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use voice_agent_core::{ErrorKind, SampleRate};

    struct FakeProvider {
        fail_auth: bool,
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StreamingTranscriber for FakeProvider {
        async fn start_session(
            &self,
            _session_id: SessionId,
            _language: &str,
        ) -> Result<futures::stream::BoxStream<'static, Result<TranscriptEvent, ClassifiedError>>, ClassifiedError>
        {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_auth {
                return Err(ClassifiedError::new(ErrorKind::Auth, "invalid credentials"));
            }
            let (_tx, rx) = mpsc::channel::<Result<TranscriptEvent, ClassifiedError>>(8);
            Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
        }

        async fn forward_chunk(&self, _session_id: SessionId, _audio: &Pcm16Audio) -> Result<(), ClassifiedError> {
            Ok(())
        }

        async fn end_session(&self, _session_id: SessionId) -> Result<(), ClassifiedError> {
            Ok(())
        }
    }

    fn sink() -> TranscriptSink {
        Arc::new(|_id, _event| Box::pin(async {}))
    }

    #[tokio::test]
    async fn create_session_succeeds_and_marks_connected() {
        let provider = Arc::new(FakeProvider { fail_auth: false, connects: Arc::new(AtomicUsize::new(0)) });
        let engine = SttEngine::new(provider, sink());
        let session_id = SessionId::new();

        engine.create_session(session_id, "en-US".to_string()).await.unwrap();
        assert_eq!(engine.connection_state(session_id), Some(SttConnectionState::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn create_session_fails_fast_on_auth_error_without_retry() {
        let connects = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(FakeProvider { fail_auth: true, connects: connects.clone() });
        let engine = SttEngine::new(provider, sink());
        let session_id = SessionId::new();

        let result = engine.create_session(session_id, "en-US".to_string()).await;
        assert!(result.is_err());
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(engine.connection_state(session_id).is_none());
    }

    #[tokio::test]
    async fn forward_chunk_is_dropped_when_not_connected() {
        let provider = Arc::new(FakeProvider { fail_auth: true, connects: Arc::new(AtomicUsize::new(0)) });
        let engine = SttEngine::new(provider, sink());
        let session_id = SessionId::new();
        // No session registered at all; forward_chunk must be a silent no-op.
        let audio = Pcm16Audio::new(SampleRate::Hz16000, vec![0, 0]);
        engine.forward_chunk(session_id, audio);
    }

    #[tokio::test]
    async fn end_session_on_unknown_session_returns_empty_string() {
        let provider = Arc::new(FakeProvider { fail_auth: false, connects: Arc::new(AtomicUsize::new(0)) });
        let engine = SttEngine::new(provider, sink());
        assert_eq!(engine.end_session(SessionId::new()).await, "");
    }

    #[tokio::test]
    async fn end_session_returns_accumulated_transcript() {
        let provider = Arc::new(FakeProvider { fail_auth: false, connects: Arc::new(AtomicUsize::new(0)) });
        let engine = SttEngine::new(provider, sink());
        let session_id = SessionId::new();
        engine.create_session(session_id, "en-US".to_string()).await.unwrap();

        if let Some(session) = engine.sessions.get(&session_id) {
            session.value().append_final("hello world");
        }

        assert_eq!(engine.end_session(session_id).await, "hello world");
    }
}

//! The TTS Engine: mutex-guarded synthesis, listener-cleanup discipline,
//! transparent reconnection with buffered replay, keep-alive (spec §4.5).

use crate::error::TtsError;
use crate::session::{TtsConnectionState, TtsSession, MAX_TEXT_CHARS};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voice_agent_core::{
    retry_with_schedule, ClassifiedError, Pcm16Audio, RetrySchedule, SampleRate, SessionId,
    StreamingSynthesizer, UtteranceId,
};

#[derive(Debug, Clone)]
pub enum TtsFrame {
    Start { utterance_id: UtteranceId },
    Chunk { utterance_id: UtteranceId, audio: Pcm16Audio },
    Complete { utterance_id: UtteranceId },
}

/// Forwards `audio.output.*` frames to the client via the Transport Hub.
pub type TtsSink = Arc<dyn Fn(SessionId, TtsFrame) -> BoxFuture<'static, ()> + Send + Sync>;

/// RAII guard standing in for the three upstream listeners
/// (`enqueue/frame`, `close`, `error`); dropped unconditionally on every
/// exit path from `synthesize`, so listener accounting never leaks (spec
/// §4.5.3 step 8).
struct ListenerGuard {
    active: Arc<AtomicUsize>,
}

impl ListenerGuard {
    fn acquire(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(3, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(3, Ordering::SeqCst);
        metrics::counter!("tts_listener_off_total").increment(3);
    }
}

/// Exclusive-synthesis guard. Owns the session's `Arc` (rather than
/// borrowing a `parking_lot::MutexGuard`) so it stays `Send` while held
/// across the synthesis `.await` — `parking_lot`'s guard is `!Send`
/// without the `send_guard` feature, which this crate doesn't enable.
struct SynthesisGuard {
    session: Arc<TtsSession>,
}

impl SynthesisGuard {
    fn try_acquire(session: Arc<TtsSession>) -> Option<Self> {
        session
            .synthesis_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { session })
    }
}

impl Drop for SynthesisGuard {
    fn drop(&mut self) {
        self.session.synthesis_active.store(false, Ordering::SeqCst);
    }
}

pub struct TtsEngine {
    provider: Arc<dyn StreamingSynthesizer>,
    sessions: DashMap<SessionId, Arc<TtsSession>>,
    sink: TtsSink,
    reconnect_buffer_max_bytes: usize,
    keep_alive: Duration,
    active_listeners: Arc<AtomicUsize>,
}

impl TtsEngine {
    pub fn new(
        provider: Arc<dyn StreamingSynthesizer>,
        sink: TtsSink,
        reconnect_buffer_max_bytes: usize,
        keep_alive: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            sessions: DashMap::new(),
            sink,
            reconnect_buffer_max_bytes,
            keep_alive,
            active_listeners: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Connect the upstream and spawn its keep-alive ticker (spec §4.5.5).
    pub async fn create_session(
        self: &Arc<Self>,
        session_id: SessionId,
        client_sample_rate: SampleRate,
    ) -> Result<(), TtsError> {
        self.provider.connect(session_id).await?;
        let session = Arc::new(TtsSession::new(self.reconnect_buffer_max_bytes, client_sample_rate));
        self.sessions.insert(session_id, session);
        self.spawn_keep_alive(session_id);
        Ok(())
    }

    fn spawn_keep_alive(self: &Arc<Self>, session_id: SessionId) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.keep_alive);
            loop {
                ticker.tick().await;
                let Some(session) = engine.sessions.get(&session_id).map(|e| e.value().clone()) else {
                    return;
                };
                if *session.connection.read() != TtsConnectionState::Connected {
                    continue;
                }
                if engine.provider.connect(session_id).await.is_err() {
                    tracing::warn!(%session_id, "tts: keep-alive ping failed");
                }
            }
        });
    }

    /// Number of listener registrations currently outstanding across all
    /// sessions; must return to zero between synthesize calls.
    pub fn active_listener_count(&self) -> usize {
        self.active_listeners.load(Ordering::SeqCst)
    }

    /// Synthesize `text` for `session_id`, returning the audio duration
    /// in milliseconds, or 0 for every short-circuit case (spec §4.5.2).
    pub async fn synthesize(self: &Arc<Self>, session_id: SessionId, text: &str) -> u64 {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return 0;
        }
        let Some(session) = self.sessions.get(&session_id).map(|e| e.value().clone()) else {
            return 0;
        };

        let truncated: String = if trimmed.chars().count() > MAX_TEXT_CHARS {
            trimmed.chars().take(MAX_TEXT_CHARS).collect()
        } else {
            trimmed.to_string()
        };

        if *session.connection.read() != TtsConnectionState::Connected {
            session.reconnection_buffer.lock().push(truncated);
            return 0;
        }

        let Some(_guard) = SynthesisGuard::try_acquire(session.clone()) else {
            metrics::counter!("tts_rejected_by_mutex_total").increment(1);
            return 0;
        };

        if !session.try_start_generating() {
            return 0;
        }

        self.run_synthesis(session_id, &session, &truncated).await
    }

    async fn run_synthesis(self: &Arc<Self>, session_id: SessionId, session: &Arc<TtsSession>, text: &str) -> u64 {
        let utterance_id = UtteranceId::new();
        *session.current_utterance.write() = Some(utterance_id);
        (self.sink)(session_id, TtsFrame::Start { utterance_id }).await;

        let stream = match self.provider.synthesize(session_id, utterance_id, text).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%session_id, %err, "tts: synthesize open failed");
                session.finish_error();
                return 0;
            }
        };

        let _listeners = ListenerGuard::acquire(self.active_listeners.clone());
        let mut stream = stream;
        let mut frames_generated: u64 = 0;
        let start = tokio::time::Instant::now();
        let mut first_frame = true;

        loop {
            match stream.next().await {
                Some(Ok(audio)) => {
                    if first_frame {
                        session.transition_streaming();
                        first_frame = false;
                    }
                    let resampled =
                        voice_agent_audio::resample(&audio.samples, audio.sample_rate, session.client_sample_rate);
                    let frame = Pcm16Audio::new(session.client_sample_rate, resampled);
                    (self.sink)(session_id, TtsFrame::Chunk { utterance_id, audio: frame }).await;
                    frames_generated += 1;
                }
                Some(Err(err)) => {
                    tracing::warn!(%session_id, %err, "tts: upstream stream error");
                    metrics::counter!("tts_synthesis_errors_total").increment(1);
                    session.finish_error();
                    self.maybe_reconnect(session_id, session.clone());
                    return 0;
                }
                None => {
                    (self.sink)(session_id, TtsFrame::Complete { utterance_id }).await;
                    session.finish_completed();
                    metrics::counter!("tts_frames_sent_total").increment(frames_generated);
                    metrics::histogram!("tts_synthesis_duration_ms").record(start.elapsed().as_millis() as f64);
                    return start.elapsed().as_millis() as u64;
                }
            }
        }
    }

    pub fn cancel(self: &Arc<Self>, session_id: SessionId) {
        if let Some(session) = self.sessions.get(&session_id) {
            session.value().cancel();
        }
    }

    /// On unexpected upstream close, reconnect on the same hybrid schedule
    /// as the STT Engine's initial connect, then replay buffered text in
    /// order (spec §4.5.4).
    fn maybe_reconnect(self: &Arc<Self>, session_id: SessionId, session: Arc<TtsSession>) {
        {
            let mut in_flight = session.reconnecting_in_flight.lock();
            if *in_flight {
                return;
            }
            *in_flight = true;
        }

        *session.connection.write() = TtsConnectionState::Reconnecting;
        let engine = self.clone();
        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let schedule = RetrySchedule::hybrid();
            let provider = engine.provider.clone();
            let outcome = retry_with_schedule(&schedule, {
                let provider = provider.clone();
                move || {
                    let provider = provider.clone();
                    async move { provider.connect(session_id).await }
                }
            })
            .await;

            *session.total_downtime_ms.write() += started.elapsed().as_millis() as u64;
            *session.reconnecting_in_flight.lock() = false;

            match outcome {
                Ok(_) => {
                    *session.connection.write() = TtsConnectionState::Connected;
                    let buffered = session.reconnection_buffer.lock().drain();
                    for text in buffered {
                        engine.synthesize(session_id, &text).await;
                    }
                }
                Err(err) => {
                    tracing::error!(%session_id, %err, "tts: reconnect exhausted");
                    *session.connection.write() = TtsConnectionState::Disconnected;
                    metrics::counter!("tts_reconnect_exhausted_total").increment(1);
                }
            }
        });
    }

    pub async fn end_session(self: &Arc<Self>, session_id: SessionId) {
        if self.sessions.remove(&session_id).is_some() {
            if let Err(err) = self.provider.disconnect(session_id).await {
                tracing::warn!(%session_id, %err, "tts: disconnect failed");
            }
        }
    }
}

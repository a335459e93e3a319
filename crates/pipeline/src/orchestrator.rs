//! Per-session glue driven by client events (spec §4.8). Holds no audio
//! data itself; every operation hands off to STT, LLM, the Semantic
//! Chunker, or TTS and records the result on the Session Registry.

use crate::error::OrchestratorError;
use std::sync::Arc;
use std::time::Duration;
use voice_agent_config::{LlmConfig, StreamingConfig, TtsConfig};
use voice_agent_core::{
    AudioConfig, Envelope, Pcm16Audio, Payload, SampleRate, SessionId, SessionState,
    StreamingChatCompletion, StreamingSynthesizer, StreamingTranscriber,
};
use voice_agent_llm::{FallbackSink, GracefulExitSignal, LlmEngine, TokenStreamSink};
use voice_agent_session::SessionRegistry;
use voice_agent_stt::{SttEngine, TranscriptSink};
use voice_agent_text_processing::{drive_stream, ChunkSynthesizer, ChunkerConfig};
use voice_agent_transport::TransportHub;
use voice_agent_tts::{TtsEngine, TtsFrame, TtsSink};

fn send_envelope(transport: &TransportHub, session_id: SessionId, payload: Payload) {
    let envelope = Envelope::new(session_id, payload);
    match envelope.encode() {
        Ok(bytes) => {
            transport.send(session_id, bytes);
        }
        Err(err) => tracing::error!(%session_id, %err, "orchestrator: failed to encode envelope"),
    }
}

pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    transport: Arc<TransportHub>,
    stt: Arc<SttEngine>,
    llm: Arc<LlmEngine>,
    tts: Arc<TtsEngine>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SessionRegistry>,
        transport: Arc<TransportHub>,
        stt_provider: Arc<dyn StreamingTranscriber>,
        llm_provider: Arc<dyn StreamingChatCompletion>,
        tts_provider: Arc<dyn StreamingSynthesizer>,
        llm_config: LlmConfig,
        streaming_config: StreamingConfig,
        tts_config: TtsConfig,
        system_prompt: impl Into<String>,
    ) -> Arc<Self> {
        let transcript_sink = build_transcript_sink(transport.clone());
        let stt = SttEngine::new(stt_provider, transcript_sink);

        let tts_sink = build_tts_sink(transport.clone());
        let tts = TtsEngine::new(
            tts_provider,
            tts_sink,
            tts_config.reconnect_buffer_max_bytes,
            Duration::from_millis(tts_config.keep_alive_ms),
        );

        let chunker_config =
            ChunkerConfig { break_marker: streaming_config.break_marker, max_buffer_size: streaming_config.max_buffer_size };
        let token_sink = build_token_sink(tts.clone(), chunker_config);
        let fallback_sink = build_fallback_sink(tts.clone());
        let graceful_exit = build_graceful_exit(registry.clone());

        let llm = LlmEngine::new(
            llm_provider,
            token_sink,
            fallback_sink,
            graceful_exit,
            system_prompt,
            llm_config.temperature,
            llm_config.max_tokens,
        );

        let orchestrator = Arc::new(Self { registry: registry.clone(), transport: transport.clone(), stt, llm, tts });
        orchestrator.register_teardown_hook();
        orchestrator
    }

    fn register_teardown_hook(self: &Arc<Self>) {
        let stt = self.stt.clone();
        let llm = self.llm.clone();
        let tts = self.tts.clone();
        let transport = self.transport.clone();
        self.registry.add_teardown_hook(Arc::new(move |session_id| {
            let stt = stt.clone();
            let llm = llm.clone();
            let tts = tts.clone();
            let transport = transport.clone();
            Box::pin(async move {
                let _ = stt.end_session(session_id).await;
                tts.end_session(session_id).await;
                llm.remove_session(session_id);
                transport.close(session_id);
            })
        }));
    }

    /// `audio.input.start`: create STT and TTS sessions in parallel;
    /// on any failure, surface an error frame and close the session.
    pub async fn handle_audio_input_start(
        self: &Arc<Self>,
        session_id: SessionId,
        sampling_rate: u32,
        language: String,
        voice_id: Option<String>,
    ) -> Result<(), OrchestratorError> {
        let Some(rate) = SampleRate::from_hz(sampling_rate) else {
            send_envelope(
                &self.transport,
                session_id,
                Payload::ErrorSystem {
                    message: format!("unsupported sampling rate: {sampling_rate}"),
                    request_event_type: "audio.input.start".to_string(),
                },
            );
            return Err(OrchestratorError::UnsupportedSampleRate(sampling_rate));
        };

        let Some(meta) = self.registry.get(session_id) else {
            return Err(OrchestratorError::InvalidSessionState);
        };
        if meta.read().state != SessionState::Idle {
            return Err(OrchestratorError::InvalidSessionState);
        }

        let (stt_result, tts_result) =
            tokio::join!(self.stt.create_session(session_id, language.clone()), self.tts.create_session(session_id, rate));

        if let Err(err) = stt_result {
            self.fail_session(session_id, "audio.input.start", &err.to_string()).await;
            return Err(OrchestratorError::Stt(err));
        }
        if let Err(err) = tts_result {
            self.fail_session(session_id, "audio.input.start", &err.to_string()).await;
            return Err(OrchestratorError::Tts(err));
        }

        let mut audio_config = AudioConfig::new(rate, language);
        audio_config.voice_id = voice_id;
        meta.write().activate(audio_config);
        Ok(())
    }

    async fn fail_session(self: &Arc<Self>, session_id: SessionId, request_event_type: &str, message: &str) {
        send_envelope(
            &self.transport,
            session_id,
            Payload::ErrorSystem { message: message.to_string(), request_event_type: request_event_type.to_string() },
        );
        self.registry.delete(session_id).await;
    }

    /// `audio.input.chunk`: resample to the rate STT expects and forward.
    /// Chunks arriving outside ACTIVE state are dropped with a warning
    /// (spec §6.1).
    pub fn handle_audio_input_chunk(self: &Arc<Self>, session_id: SessionId, audio: Vec<u8>) {
        let Some(meta) = self.registry.get(session_id) else {
            tracing::warn!(%session_id, "audio.input.chunk for unknown session, dropped");
            return;
        };
        let audio_config = {
            let guard = meta.read();
            if guard.state != SessionState::Active {
                tracing::warn!(%session_id, ?guard.state, "audio.input.chunk outside ACTIVE state, dropped");
                return;
            }
            guard.audio.clone()
        };
        let Some(config) = audio_config else {
            return;
        };

        self.registry.touch(session_id);
        let resampled = voice_agent_audio::resample(&audio, config.sample_rate, SampleRate::Hz16000);
        self.stt.forward_chunk(session_id, Pcm16Audio::new(SampleRate::Hz16000, resampled));
    }

    /// `audio.input.end`: finalize the transcript and, if non-empty,
    /// invoke the LLM Engine.
    pub async fn handle_audio_input_end(self: &Arc<Self>, session_id: SessionId) {
        let transcript = self.stt.end_session(session_id).await;
        if !transcript.trim().is_empty() {
            self.llm.generate_response(session_id, transcript);
        }
    }

    /// Client disconnect: cascade teardown via the Session Registry,
    /// whose teardown hooks close out STT, LLM, TTS, and the Transport
    /// Hub (spec §4.8).
    pub async fn handle_disconnect(self: &Arc<Self>, session_id: SessionId) {
        self.registry.delete(session_id).await;
    }
}

fn build_transcript_sink(transport: Arc<TransportHub>) -> TranscriptSink {
    Arc::new(move |session_id, event| {
        let transport = transport.clone();
        Box::pin(async move {
            let payload = if event.is_final {
                Payload::TranscriptFinal { text: event.text, confidence: event.confidence, timestamp: event.timestamp_ms }
            } else {
                Payload::TranscriptInterim { text: event.text, confidence: event.confidence, timestamp: event.timestamp_ms }
            };
            send_envelope(&transport, session_id, payload);
        })
    })
}

fn build_tts_sink(transport: Arc<TransportHub>) -> TtsSink {
    Arc::new(move |session_id, frame| {
        let transport = transport.clone();
        Box::pin(async move {
            let payload = match frame {
                TtsFrame::Start { utterance_id } => Payload::AudioOutputStart { utterance_id },
                TtsFrame::Chunk { utterance_id, audio } => {
                    Payload::AudioOutputChunk { audio: audio.samples, utterance_id, sample_rate: audio.sample_rate.hz() }
                }
                TtsFrame::Complete { utterance_id } => Payload::AudioOutputComplete { utterance_id },
            };
            send_envelope(&transport, session_id, payload);
        })
    })
}

fn build_token_sink(tts: Arc<TtsEngine>, chunker_config: ChunkerConfig) -> TokenStreamSink {
    Arc::new(move |session_id, stream| {
        let tts = tts.clone();
        let config = chunker_config.clone();
        Box::pin(async move {
            let synth: ChunkSynthesizer = Arc::new(move |text| {
                let tts = tts.clone();
                Box::pin(async move {
                    tts.synthesize(session_id, &text).await;
                    Ok(())
                })
            });
            drive_stream(stream, config, synth).await
        })
    })
}

fn build_fallback_sink(tts: Arc<TtsEngine>) -> FallbackSink {
    Arc::new(move |session_id, text| {
        let tts = tts.clone();
        Box::pin(async move {
            tts.synthesize(session_id, &text).await;
        })
    })
}

fn build_graceful_exit(registry: Arc<SessionRegistry>) -> GracefulExitSignal {
    Arc::new(move |session_id| {
        let registry = registry.clone();
        Box::pin(async move {
            registry.delete(session_id).await;
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::sync::Mutex as StdMutex;
    use voice_agent_core::{ChatDelta, ChatMessage, ClassifiedError, TranscriptEvent, UtteranceId};
    use voice_agent_session::ConnectionId;

    struct RecordingSink {
        frames: Arc<StdMutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl voice_agent_transport::OutboundSink for RecordingSink {
        async fn send(&mut self, frame: Vec<u8>) -> bool {
            self.frames.lock().unwrap().push(frame);
            true
        }
        async fn close(&mut self) {}
    }

    struct FakeStt;
    #[async_trait]
    impl StreamingTranscriber for FakeStt {
        async fn start_session(
            &self,
            _session_id: SessionId,
            _language: &str,
        ) -> Result<BoxStream<'static, Result<TranscriptEvent, ClassifiedError>>, ClassifiedError> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(TranscriptEvent {
                text: "Hello, how are you?".to_string(),
                confidence: 0.95,
                is_final: true,
                timestamp_ms: 0,
            })])))
        }
        async fn forward_chunk(&self, _session_id: SessionId, _audio: &Pcm16Audio) -> Result<(), ClassifiedError> {
            Ok(())
        }
        async fn end_session(&self, _session_id: SessionId) -> Result<(), ClassifiedError> {
            Ok(())
        }
    }

    struct FakeLlm;
    #[async_trait]
    impl StreamingChatCompletion for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }
        async fn stream_completion(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<BoxStream<'static, Result<ChatDelta, ClassifiedError>>, ClassifiedError> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(ChatDelta {
                text: "Hi! ||BREAK|| How can I help?".to_string(),
                is_final: true,
            })])))
        }
    }

    struct FakeTts;
    #[async_trait]
    impl StreamingSynthesizer for FakeTts {
        async fn connect(&self, _session_id: SessionId) -> Result<(), ClassifiedError> {
            Ok(())
        }
        async fn synthesize(
            &self,
            _session_id: SessionId,
            _utterance_id: UtteranceId,
            _text: &str,
        ) -> Result<BoxStream<'static, Result<Pcm16Audio, ClassifiedError>>, ClassifiedError> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(Pcm16Audio::new(SampleRate::Hz16000, vec![0, 0]))])))
        }
        async fn disconnect(&self, _session_id: SessionId) -> Result<(), ClassifiedError> {
            Ok(())
        }
    }

    fn test_orchestrator(registry: Arc<SessionRegistry>, transport: Arc<TransportHub>) -> Arc<Orchestrator> {
        Orchestrator::new(
            registry,
            transport,
            Arc::new(FakeStt),
            Arc::new(FakeLlm),
            Arc::new(FakeTts),
            LlmConfig::default(),
            StreamingConfig::default(),
            TtsConfig::default(),
            "you are a helpful assistant",
        )
    }

    #[tokio::test]
    async fn happy_path_drives_stt_then_llm_then_tts() {
        let registry = Arc::new(SessionRegistry::new());
        let transport = Arc::new(TransportHub::new());
        let frames = Arc::new(StdMutex::new(Vec::new()));
        let session_id = registry.create(ConnectionId::new());
        transport.register(session_id, RecordingSink { frames: frames.clone() });

        let orchestrator = test_orchestrator(registry.clone(), transport.clone());

        orchestrator
            .handle_audio_input_start(session_id, 48_000, "en-US".to_string(), None)
            .await
            .unwrap();
        orchestrator.handle_audio_input_chunk(session_id, vec![0, 0, 0, 0]);
        orchestrator.handle_audio_input_end(session_id).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_cascades_teardown_through_registry() {
        let registry = Arc::new(SessionRegistry::new());
        let transport = Arc::new(TransportHub::new());
        let session_id = registry.create(ConnectionId::new());
        transport.register(session_id, RecordingSink { frames: Arc::new(StdMutex::new(Vec::new())) });

        let orchestrator = test_orchestrator(registry.clone(), transport.clone());
        orchestrator
            .handle_audio_input_start(session_id, 16_000, "en-US".to_string(), None)
            .await
            .unwrap();

        orchestrator.handle_disconnect(session_id).await;
        assert!(registry.get(session_id).is_none());
    }

    #[tokio::test]
    async fn chunk_outside_active_state_is_dropped_without_panic() {
        let registry = Arc::new(SessionRegistry::new());
        let transport = Arc::new(TransportHub::new());
        let session_id = registry.create(ConnectionId::new());
        transport.register(session_id, RecordingSink { frames: Arc::new(StdMutex::new(Vec::new())) });

        let orchestrator = test_orchestrator(registry.clone(), transport.clone());
        // No audio.input.start yet; session is still IDLE.
        orchestrator.handle_audio_input_chunk(session_id, vec![0, 0]);
    }

    #[tokio::test]
    async fn unsupported_sampling_rate_surfaces_error_and_closes_session() {
        let registry = Arc::new(SessionRegistry::new());
        let transport = Arc::new(TransportHub::new());
        let frames = Arc::new(StdMutex::new(Vec::new()));
        let session_id = registry.create(ConnectionId::new());
        transport.register(session_id, RecordingSink { frames: frames.clone() });

        let orchestrator = test_orchestrator(registry.clone(), transport.clone());
        let result = orchestrator.handle_audio_input_start(session_id, 44_100, "en-US".to_string(), None).await;

        assert!(result.is_err());
        assert!(!frames.lock().unwrap().is_empty());
    }
}

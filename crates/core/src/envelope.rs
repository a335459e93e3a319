//! The client↔server wire frame (spec §3.5, §6.1).
//!
//! Every frame carries a dotted `event_type`, a time-ordered `event_id`, the
//! owning `session_id`, and an event-specific `payload`. The wire format is
//! binary (`bincode`); field naming is case-preserving because we never
//! `serde(rename_all = ...)` — the Rust field names are already the wire
//! names, encoded positionally by `bincode` and keyed by `event_type` on the
//! JSON/debug surfaces used in tests.

use crate::audio::SampleRate;
use crate::ids::{EventId, SessionId, UtteranceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to encode envelope: {0}")]
    Encode(String),
    #[error("failed to decode envelope: {0}")]
    Decode(String),
}

/// Event-specific payload. One variant per dotted `event_type` in spec §6.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    // Client -> server
    AudioInputStart { sampling_rate: u32, language: String, voice_id: Option<String> },
    AudioInputChunk { audio: Vec<u8> },
    AudioInputEnd,

    // Server -> client
    ConnectionLifecycleAck { session_id: SessionId },
    TranscriptInterim { text: String, confidence: f32, timestamp: u64 },
    TranscriptFinal { text: String, confidence: f32, timestamp: u64 },
    AudioOutputStart { utterance_id: UtteranceId },
    AudioOutputChunk { audio: Vec<u8>, utterance_id: UtteranceId, sample_rate: u32 },
    AudioOutputComplete { utterance_id: UtteranceId },
    ErrorSystem { message: String, request_event_type: String },
}

impl Payload {
    /// The dotted event type this payload corresponds to (spec §6.1).
    pub fn event_type(&self) -> &'static str {
        match self {
            Payload::AudioInputStart { .. } => "audio.input.start",
            Payload::AudioInputChunk { .. } => "audio.input.chunk",
            Payload::AudioInputEnd => "audio.input.end",
            Payload::ConnectionLifecycleAck { .. } => "connection.lifecycle.ack",
            Payload::TranscriptInterim { .. } => "transcript.interim",
            Payload::TranscriptFinal { .. } => "transcript.final",
            Payload::AudioOutputStart { .. } => "audio.output.start",
            Payload::AudioOutputChunk { .. } => "audio.output.chunk",
            Payload::AudioOutputComplete { .. } => "audio.output.complete",
            Payload::ErrorSystem { .. } => "error.system.generic",
        }
    }

    pub fn sample_rate_enum(rate_hz: u32) -> Option<SampleRate> {
        SampleRate::from_hz(rate_hz)
    }
}

/// The uniform frame wrapper (spec §3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event_type: String,
    pub event_id: EventId,
    pub session_id: SessionId,
    pub payload: Payload,
}

impl Envelope {
    /// Build a new envelope, minting a fresh `event_id` and deriving
    /// `event_type` from the payload so the two can never disagree.
    pub fn new(session_id: SessionId, payload: Payload) -> Self {
        Self {
            event_type: payload.event_type().to_string(),
            event_id: EventId::new(),
            session_id,
            payload,
        }
    }

    /// Encode to the wire binary format.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decode from the wire binary format.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

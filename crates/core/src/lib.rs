//! Core types shared by every voice-agent crate.
//!
//! - Time-ordered identifiers ([`ids`])
//! - The client/server wire envelope ([`envelope`])
//! - Session identity and lifecycle ([`session`])
//! - PCM16 audio types ([`audio`])
//! - The provider error taxonomy and crate-wide `Error` ([`error`])
//! - A generic retry-with-schedule driver ([`retry`])
//! - Upstream provider contracts for STT/LLM/TTS ([`traits`])

pub mod audio;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod retry;
pub mod session;
pub mod traits;

pub use audio::{Pcm16Audio, SampleRate};
pub use envelope::{CodecError, Envelope, Payload};
pub use error::{ClassifiedError, Error, ErrorKind, Result};
pub use ids::{EventId, SessionId, UtteranceId};
pub use retry::{retry_with_schedule, RetryOutcome, RetrySchedule};
pub use session::{now_ms, AudioConfig, SessionMeta, SessionState};
pub use traits::{
    ChatDelta, ChatMessage, ChatRole, StreamingChatCompletion, StreamingSynthesizer,
    StreamingTranscriber, TranscriptEvent,
};

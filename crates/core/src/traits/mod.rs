//! Upstream provider contracts (spec §6.2).
//!
//! Every provider adapter — STT, LLM, TTS — exposes a streaming trait plus
//! a `classify_error` hook so the engine crates can drive a single shared
//! retry policy ([`crate::retry`]) regardless of which upstream is behind
//! it.

mod chat;
mod synthesizer;
mod transcriber;

pub use chat::{ChatDelta, ChatMessage, ChatRole, StreamingChatCompletion};
pub use synthesizer::StreamingSynthesizer;
pub use transcriber::{StreamingTranscriber, TranscriptEvent};

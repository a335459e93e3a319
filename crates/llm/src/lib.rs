//! LLM Engine: per-session conversation history, streaming completion
//! against a pluggable provider, and tiered canned-text fallback on
//! upstream failure.

pub mod context;
pub mod engine;
pub mod error;
pub mod providers;

pub use context::{HistoryEntry, LlmContext, MAX_MESSAGES};
pub use engine::{fallback_text, FallbackSink, GracefulExitSignal, LlmEngine, TokenStreamSink};
pub use error::LlmError;
pub use providers::ollama::{OllamaConfig, OllamaProvider};

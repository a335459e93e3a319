//! The Orchestrator: a thin per-session dispatcher driven by client
//! events, tying STT, LLM, the Semantic Chunker, and TTS together (spec
//! §4.8).

mod error;
mod orchestrator;

pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;

//! Semantic Chunker: splits an LLM token stream at an inline break
//! marker into chunks sized for natural prosody, and drives the TTS
//! Engine one chunk at a time.

pub mod chunker;
pub mod driver;

pub use chunker::{ChunkerConfig, SemanticChunker};
pub use driver::{drive_stream, ChunkSynthesizer};

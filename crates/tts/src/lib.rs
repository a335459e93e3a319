//! TTS Engine: mutex-guarded synthesis, transparent reconnection with
//! buffered replay, and a listener-cleanup discipline that never leaks
//! across synthesize calls (spec §4.5).

mod engine;
mod error;
pub mod providers;
mod session;

pub use engine::{TtsEngine, TtsFrame, TtsSink};
pub use error::TtsError;
pub use providers::cartesia::{CartesiaConfig, CartesiaProvider};
pub use session::{ReconnectionBuffer, TtsConnectionState, TtsSession, TtsState, MAX_TEXT_CHARS};

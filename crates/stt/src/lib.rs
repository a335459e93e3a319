//! STT Engine: one upstream streaming connection per session, transcript
//! accumulation, transparent reconnect (spec §4.4).

mod engine;
mod error;
pub mod providers;
mod session;

pub use engine::{SttEngine, TranscriptSink};
pub use error::SttError;
pub use providers::deepgram::{DeepgramConfig, DeepgramProvider};
pub use session::{SttConnectionState, SttSession};

//! Per-session STT state, private to the engine (spec §3.2).

use parking_lot::RwLock;

pub const MAX_TRANSCRIPT_BYTES: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

#[derive(Debug, Default)]
pub struct SttMetrics {
    pub chunks_forwarded: u64,
    pub transcripts_received: u64,
    pub errors: u64,
    pub reconnections: u64,
}

pub struct SttSession {
    pub state: RwLock<SttConnectionState>,
    accumulated_transcript: RwLock<String>,
    interim_transcript: RwLock<String>,
    pub retry_count: RwLock<u32>,
    pub reconnect_attempts: RwLock<u32>,
    pub metrics: RwLock<SttMetrics>,
    /// Fixed for the session's lifetime (spec §3.1); a reconnect must
    /// re-open the upstream stream with this same language, never a
    /// hard-coded default.
    pub language: String,
}

impl SttSession {
    pub fn new(language: String) -> Self {
        Self {
            state: RwLock::new(SttConnectionState::Connecting),
            accumulated_transcript: RwLock::new(String::new()),
            interim_transcript: RwLock::new(String::new()),
            retry_count: RwLock::new(0),
            reconnect_attempts: RwLock::new(0),
            metrics: RwLock::new(SttMetrics::default()),
            language,
        }
    }

    pub fn set_interim(&self, text: &str) {
        *self.interim_transcript.write() = text.to_string();
    }

    pub fn interim(&self) -> String {
        self.interim_transcript.read().clone()
    }

    /// Append a final transcript fragment with a single-space separator,
    /// enforcing the 50 KB bound by dropping the oldest bytes (spec
    /// §4.4.4).
    pub fn append_final(&self, text: &str) {
        let mut transcript = self.accumulated_transcript.write();
        if !transcript.is_empty() && !text.is_empty() {
            transcript.push(' ');
        }
        transcript.push_str(text);

        if transcript.len() > MAX_TRANSCRIPT_BYTES {
            let excess = transcript.len() - MAX_TRANSCRIPT_BYTES;
            // Drop from the front at a char boundary so we never split a
            // multi-byte UTF-8 sequence.
            let mut cut = excess;
            while cut < transcript.len() && !transcript.is_char_boundary(cut) {
                cut += 1;
            }
            transcript.drain(..cut);
        }
    }

    pub fn accumulated(&self) -> String {
        self.accumulated_transcript.read().clone()
    }

    pub fn take_accumulated(&self) -> String {
        std::mem::take(&mut *self.accumulated_transcript.write())
    }
}

impl Default for SttSession {
    fn default() -> Self {
        Self::new()
    }
}

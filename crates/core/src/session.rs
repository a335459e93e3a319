//! Session identity and lifecycle state (spec §3.1).

use crate::audio::SampleRate;
use crate::ids::SessionId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Session lifecycle state. Created IDLE on connect, ACTIVE on
/// `audio.input.start`, ENDED on disconnect or explicit close (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Active,
    Ended,
}

/// Audio configuration negotiated at `audio.input.start` (spec §3.1, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    pub channels: u8,
    pub language: String,
    pub voice_id: Option<String>,
}

impl AudioConfig {
    pub fn new(sample_rate: SampleRate, language: impl Into<String>) -> Self {
        Self { sample_rate, channels: 1, language: language.into(), voice_id: None }
    }
}

/// Milliseconds since the Unix epoch, the timestamp unit used throughout
/// the envelope and session data model (spec §3.1).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// Per-connection session metadata. Ownership of the STT/LLM/TTS sessions
/// themselves lives in their respective engine crates; this is the shared
/// identity and timestamp record the Session Registry and Orchestrator
/// both read (spec §3.1).
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub id: SessionId,
    pub state: SessionState,
    pub audio: Option<AudioConfig>,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    pub ended_at_ms: Option<u64>,
}

impl SessionMeta {
    pub fn new(id: SessionId) -> Self {
        let now = now_ms();
        Self {
            id,
            state: SessionState::Idle,
            audio: None,
            created_at_ms: now,
            last_activity_ms: now,
            ended_at_ms: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_ms = now_ms();
    }

    pub fn activate(&mut self, audio: AudioConfig) {
        self.audio = Some(audio);
        self.state = SessionState::Active;
        self.touch();
    }

    pub fn end(&mut self) {
        self.state = SessionState::Ended;
        self.ended_at_ms = Some(now_ms());
    }

    pub fn age_ms(&self) -> u64 {
        now_ms().saturating_sub(self.created_at_ms)
    }

    pub fn idle_ms(&self) -> u64 {
        now_ms().saturating_sub(self.last_activity_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_idle_active_ended() {
        let mut meta = SessionMeta::new(SessionId::new());
        assert_eq!(meta.state, SessionState::Idle);

        meta.activate(AudioConfig::new(SampleRate::Hz48000, "en-US"));
        assert_eq!(meta.state, SessionState::Active);
        assert!(meta.audio.is_some());

        meta.end();
        assert_eq!(meta.state, SessionState::Ended);
        assert!(meta.ended_at_ms.is_some());
    }
}

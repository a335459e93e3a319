//! Per-session TTS state machine and reconnection buffer (spec §3.4, §4.5.1).

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use voice_agent_core::{SampleRate, UtteranceId};

pub const MAX_TEXT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsState {
    Idle,
    Generating,
    Streaming,
    Completed,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

/// Bounded FIFO of text submitted while disconnected; drop-oldest when
/// full (spec §3.4, §4.5.2).
pub struct ReconnectionBuffer {
    entries: VecDeque<String>,
    total_bytes: usize,
    max_bytes: usize,
}

impl ReconnectionBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self { entries: VecDeque::new(), total_bytes: 0, max_bytes }
    }

    pub fn push(&mut self, text: String) {
        self.total_bytes += text.len();
        self.entries.push_back(text);
        while self.total_bytes > self.max_bytes {
            if let Some(dropped) = self.entries.pop_front() {
                self.total_bytes -= dropped.len();
            } else {
                break;
            }
        }
    }

    /// Drain in insertion order.
    pub fn drain(&mut self) -> Vec<String> {
        self.total_bytes = 0;
        self.entries.drain(..).collect()
    }
}

pub struct TtsSession {
    pub state: RwLock<TtsState>,
    pub connection: RwLock<TtsConnectionState>,
    /// Held for the duration of exactly one synthesize call; guards
    /// IDLE -> GENERATING and back (spec §4.5.2). A plain `AtomicBool`
    /// rather than a `parking_lot::Mutex` guard so the RAII release type
    /// held across the synthesis `.await` stays `Send`.
    pub synthesis_active: AtomicBool,
    pub current_utterance: RwLock<Option<UtteranceId>>,
    pub reconnection_buffer: Mutex<ReconnectionBuffer>,
    pub total_downtime_ms: RwLock<u64>,
    pub reconnecting_in_flight: Mutex<bool>,
    pub client_sample_rate: SampleRate,
}

impl TtsSession {
    pub fn new(reconnect_buffer_max_bytes: usize, client_sample_rate: SampleRate) -> Self {
        Self {
            state: RwLock::new(TtsState::Idle),
            connection: RwLock::new(TtsConnectionState::Connected),
            synthesis_active: AtomicBool::new(false),
            current_utterance: RwLock::new(None),
            reconnection_buffer: Mutex::new(ReconnectionBuffer::new(reconnect_buffer_max_bytes)),
            total_downtime_ms: RwLock::new(0),
            reconnecting_in_flight: Mutex::new(false),
            client_sample_rate,
        }
    }

    /// Attempt IDLE -> GENERATING. Invalid transitions are rejected
    /// silently, leaving state unchanged (spec §4.5.1).
    pub fn try_start_generating(&self) -> bool {
        let mut state = self.state.write();
        if *state == TtsState::Idle {
            *state = TtsState::Generating;
            true
        } else {
            metrics::counter!("tts_invalid_transition_total").increment(1);
            false
        }
    }

    pub fn transition_streaming(&self) {
        let mut state = self.state.write();
        if *state == TtsState::Generating {
            *state = TtsState::Streaming;
        }
    }

    pub fn finish_completed(&self) {
        *self.state.write() = TtsState::Completed;
        *self.state.write() = TtsState::Idle;
    }

    pub fn finish_error(&self) {
        *self.state.write() = TtsState::Error;
        *self.state.write() = TtsState::Idle;
    }

    pub fn cancel(&self) -> bool {
        let mut state = self.state.write();
        if *state == TtsState::Generating || *state == TtsState::Streaming {
            *state = TtsState::Cancelled;
            *state = TtsState::Idle;
            true
        } else {
            false
        }
    }
}

//! Per-session conversation history and request queue (spec §3.3, §4.6.4).

use std::collections::VecDeque;
use voice_agent_core::{now_ms, ChatMessage};

pub const MAX_MESSAGES: usize = 50;

/// A history entry: the provider-facing message plus the timestamp it
/// was recorded at (spec §3.3).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub message: ChatMessage,
    pub timestamp_ms: u64,
}

pub struct LlmContext {
    messages: Vec<HistoryEntry>,
    pub failure_count: u32,
    pub is_processing: bool,
    pending: VecDeque<()>,
}

impl LlmContext {
    /// The system prompt is prepended exactly once, at position 0.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![HistoryEntry { message: ChatMessage::system(system_prompt), timestamp_ms: now_ms() }],
            failure_count: 0,
            is_processing: false,
            pending: VecDeque::new(),
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.messages
    }

    /// The provider-facing message list (system first), for handing to a
    /// `StreamingChatCompletion` call.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(|e| e.message.clone()).collect()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(HistoryEntry { message: ChatMessage::user(text), timestamp_ms: now_ms() });
        self.prune();
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(HistoryEntry { message: ChatMessage::assistant(text), timestamp_ms: now_ms() });
        self.prune();
    }

    /// Drop the oldest non-system messages until length <= 50 (spec
    /// §4.6.4). The system message at position 0 is never evicted.
    fn prune(&mut self) {
        while self.messages.len() > MAX_MESSAGES {
            // index 1 is the oldest non-system message; index 0 is the
            // system prompt and is skipped.
            self.messages.remove(1);
        }
    }

    pub fn on_success(&mut self) {
        self.failure_count = 0;
    }

    /// Increment the consecutive-failure counter and return the new
    /// value, used to select the fallback tier (spec §4.6.3).
    pub fn on_failure(&mut self) -> u32 {
        self.failure_count += 1;
        self.failure_count
    }

    /// Enqueue this turn. Returns `true` if the caller should start
    /// processing immediately (nothing else in flight).
    pub fn enqueue_turn(&mut self) -> bool {
        self.pending.push_back(());
        if self.is_processing {
            false
        } else {
            self.is_processing = true;
            // Consume the marker we just pushed; processing proceeds
            // immediately rather than waiting for a drain iteration.
            self.pending.pop_front();
            true
        }
    }

    /// Called at the end of one processing iteration. Returns `true` if
    /// another queued turn should be processed next (spec §4.6.2 step 7:
    /// "recurse").
    pub fn finish_turn_and_check_next(&mut self) -> bool {
        if let Some(()) = self.pending.pop_front() {
            true
        } else {
            self.is_processing = false;
            false
        }
    }
}

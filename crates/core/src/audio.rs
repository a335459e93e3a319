//! Audio types shared by the transport, STT, and TTS layers (spec §3.1).

use serde::{Deserialize, Serialize};

/// Input/output sample rates the pipeline accepts (spec §3.1, §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz8000,
    Hz16000,
    Hz48000,
}

impl SampleRate {
    pub fn hz(self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8_000,
            SampleRate::Hz16000 => 16_000,
            SampleRate::Hz48000 => 48_000,
        }
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            8_000 => Some(SampleRate::Hz8000),
            16_000 => Some(SampleRate::Hz16000),
            48_000 => Some(SampleRate::Hz48000),
            _ => None,
        }
    }
}

/// Signed PCM16 little-endian mono audio, the only encoding the pipeline
/// speaks internally (spec §3.1: encoding, channels = 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pcm16Audio {
    pub sample_rate: SampleRate,
    pub samples: Vec<u8>,
}

impl Pcm16Audio {
    pub fn new(sample_rate: SampleRate, samples: Vec<u8>) -> Self {
        Self { sample_rate, samples }
    }

    /// Number of 16-bit samples (truncates a malformed odd-length buffer).
    pub fn sample_count(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_ms(&self) -> u64 {
        let frames = self.sample_count() as u64;
        (frames * 1000) / self.sample_rate.hz() as u64
    }
}

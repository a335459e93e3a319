//! Layered settings (spec §6.3).
//!
//! Defaults are built in, optionally overlaid by a config file, and
//! finally overlaid by `VOICE_AGENT__<SECTION>__<KEY>` environment
//! variables (double underscore as the config crate's section separator).
//! Provider credentials are read once at process startup; a missing
//! credential fails startup, not individual session creation.

use crate::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    pub break_marker: String,
    pub max_buffer_size: usize,
    pub sequential_tts: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { break_marker: "||BREAK||".to_string(), max_buffer_size: 400, sequential_tts: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub max_messages: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { max_messages: 50, temperature: 0.7, max_tokens: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    pub session_max_ms: u64,
    pub inactivity_max_ms: u64,
    pub max_transcript_bytes: usize,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self { session_max_ms: 3_600_000, inactivity_max_ms: 300_000, max_transcript_bytes: 50_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub max_text_chars: usize,
    pub reconnect_buffer_max_bytes: usize,
    pub keep_alive_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self { max_text_chars: 10_000, reconnect_buffer_max_bytes: 50_000, keep_alive_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub cleanup_interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { cleanup_interval_ms: 300_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// Process-wide upstream provider credentials. Read once at startup;
/// `load_settings` fails the whole process if any is absent (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub stt_api_key: String,
    pub llm_api_key: String,
    pub tts_api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    pub credentials: Option<Credentials>,
}

/// Load settings from an optional config file overlaid by
/// `VOICE_AGENT__SECTION__KEY` environment variables, then require
/// provider credentials to be present.
pub fn load_settings(config_path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder()
        .set_default("server.bind_addr", default_bind_addr())?
        .set_default("streaming.break_marker", "||BREAK||")?
        .set_default("streaming.max_buffer_size", 400_i64)?
        .set_default("streaming.sequential_tts", true)?
        .set_default("llm.max_messages", 50_i64)?
        .set_default("llm.temperature", 0.7_f64)?
        .set_default("llm.max_tokens", 500_i64)?
        .set_default("stt.session_max_ms", 3_600_000_i64)?
        .set_default("stt.inactivity_max_ms", 300_000_i64)?
        .set_default("stt.max_transcript_bytes", 50_000_i64)?
        .set_default("tts.max_text_chars", 10_000_i64)?
        .set_default("tts.reconnect_buffer_max_bytes", 50_000_i64)?
        .set_default("tts.keep_alive_ms", 30_000_i64)?
        .set_default("supervisor.cleanup_interval_ms", 300_000_i64)?;

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("VOICE_AGENT").separator("__").try_parsing(true),
    );

    let raw = builder.build()?;
    let settings: Settings = raw.try_deserialize()?;

    if settings.credentials.is_none() {
        return Err(ConfigError::MissingField(
            "credentials (stt_api_key, llm_api_key, tts_api_key)".to_string(),
        ));
    }

    Ok(settings)
}

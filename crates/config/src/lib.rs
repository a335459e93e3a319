//! Layered configuration for the voice agent (spec §6.3).
//!
//! Loads defaults, an optional config file, and `VOICE_AGENT__SECTION__KEY`
//! environment overrides, in that order of increasing precedence.

pub mod settings;

pub use settings::{
    load_settings, Credentials, LlmConfig, ServerConfig, Settings, StreamingConfig, SttConfig,
    SupervisorConfig, TtsConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

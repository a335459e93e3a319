use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("unsupported sampling rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("session already active or unknown")]
    InvalidSessionState,

    #[error("stt session failed: {0}")]
    Stt(#[from] voice_agent_stt::SttError),

    #[error("tts session failed: {0}")]
    Tts(#[from] voice_agent_tts::TtsError),
}

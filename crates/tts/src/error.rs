use thiserror::Error;
use voice_agent_core::ClassifiedError;

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("upstream provider error: {0}")]
    Provider(#[from] ClassifiedError),

    #[error("no such session")]
    NoSession,
}

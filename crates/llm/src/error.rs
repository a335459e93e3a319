use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for voice_agent_core::ClassifiedError {
    fn from(err: LlmError) -> Self {
        use voice_agent_core::ErrorKind;
        match err {
            LlmError::Network(msg) => voice_agent_core::ClassifiedError::new(ErrorKind::Network, msg),
            LlmError::Api(msg) => voice_agent_core::ClassifiedError::new(ErrorKind::Transient, msg),
            LlmError::InvalidResponse(msg) => {
                voice_agent_core::ClassifiedError::new(ErrorKind::Fatal, msg)
            }
            LlmError::Configuration(msg) => voice_agent_core::ClassifiedError::new(ErrorKind::Fatal, msg),
        }
    }
}

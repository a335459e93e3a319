//! Provider-agnostic error taxonomy (spec §7) and the crate-wide `Error`/`Result`.
//!
//! `ErrorKind` is the sum type every upstream provider classifies its errors
//! into; `classify_status` is the shared HTTP-status mapping used by the STT,
//! LLM and TTS provider adapters so retry policy lives in one place.

use std::time::Duration;
use thiserror::Error;

/// Provider error classification, independent of which upstream raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 4xx other than 429: not retryable, session moves to ERROR.
    Fatal,
    /// 401/403: not retryable, process-level alert.
    Auth,
    /// 429: retryable, honor `retry_after` when present.
    RateLimit,
    /// Connection refused / reset / DNS failure.
    Network,
    /// Request exceeded its deadline.
    Timeout,
    /// 5xx: retryable on a moderate schedule.
    Transient,
}

impl ErrorKind {
    /// Whether a generic retry driver should re-attempt after this error.
    pub fn retryable(self) -> bool {
        !matches!(self, ErrorKind::Fatal | ErrorKind::Auth)
    }
}

/// A classified upstream failure carrying an optional provider-supplied
/// retry-after hint (from a `Retry-After` header or equivalent).
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retry_after: None }
    }

    pub fn with_retry_after(mut self, d: Duration) -> Self {
        self.retry_after = Some(d);
        self
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClassifiedError {}

/// Classify an HTTP-style status code into an `ErrorKind`.
///
/// Shared by the STT, LLM and TTS provider adapters (spec §7 table).
pub fn classify_status(status: u16, retry_after: Option<Duration>) -> ClassifiedError {
    let kind = match status {
        401 | 403 => ErrorKind::Auth,
        429 => ErrorKind::RateLimit,
        400..=499 => ErrorKind::Fatal,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Fatal,
    };
    let mut err = ClassifiedError::new(kind, format!("upstream returned status {status}"));
    if let Some(d) = retry_after {
        err = err.with_retry_after(d);
    }
    err
}

/// Crate-wide error type. Each downstream crate defines its own
/// `thiserror` enum and converts into this one at the boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("session error: {0}")]
    Session(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream provider error: {0}")]
    Provider(#[from] ClassifiedError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid envelope: {0}")]
    Codec(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_and_auth_are_not_retryable() {
        assert!(!ErrorKind::Fatal.retryable());
        assert!(!ErrorKind::Auth.retryable());
    }

    #[test]
    fn rate_limit_network_timeout_transient_are_retryable() {
        assert!(ErrorKind::RateLimit.retryable());
        assert!(ErrorKind::Network.retryable());
        assert!(ErrorKind::Timeout.retryable());
        assert!(ErrorKind::Transient.retryable());
    }

    #[test]
    fn classify_status_maps_table() {
        assert_eq!(classify_status(401, None).kind, ErrorKind::Auth);
        assert_eq!(classify_status(403, None).kind, ErrorKind::Auth);
        assert_eq!(classify_status(404, None).kind, ErrorKind::Fatal);
        assert_eq!(classify_status(429, None).kind, ErrorKind::RateLimit);
        assert_eq!(classify_status(500, None).kind, ErrorKind::Transient);
        assert_eq!(classify_status(503, None).kind, ErrorKind::Transient);
    }
}

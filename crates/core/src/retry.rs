//! Generic retry-with-schedule driver (spec §9 design notes).
//!
//! Shared by STT initial connect, TTS initial connect, and TTS reconnection
//! (spec §4.4.2, §4.5.4): each site supplies its own `RetrySchedule` and an
//! async operation; the driver owns the sleep/attempt/classify loop.

use crate::error::ClassifiedError;
use std::time::Duration;

/// An ordered list of delays to wait before each attempt. `delays[0]` is
/// typically `Duration::ZERO` (try immediately before backing off).
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Initial-connection schedule: {0, 100ms, 1s, 3s, 5s}, spec §4.4.2.
    pub fn hybrid() -> Self {
        Self::new(vec![
            Duration::ZERO,
            Duration::from_millis(100),
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(5),
        ])
    }

    /// Mid-stream reconnect schedule: {0, 100ms, 500ms}, spec §4.4.2, §4.5.4.
    pub fn fast() -> Self {
        Self::new(vec![Duration::ZERO, Duration::from_millis(100), Duration::from_millis(500)])
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    pub fn total_worst_case(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Outcome of a full retry run, retained for metrics (attempts made, total
/// elapsed downtime).
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: usize,
}

/// Drive `op` against `schedule`, sleeping the configured delay before each
/// attempt and stopping as soon as `op` succeeds or returns a
/// non-retryable error.
pub async fn retry_with_schedule<T, F, Fut>(
    schedule: &RetrySchedule,
    mut op: F,
) -> Result<RetryOutcome<T>, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ClassifiedError>>,
{
    let mut last_err: Option<ClassifiedError> = None;

    for (attempt, delay) in schedule.delays.iter().enumerate() {
        if !delay.is_zero() {
            tokio::time::sleep(*delay).await;
        }

        match op().await {
            Ok(value) => return Ok(RetryOutcome { value, attempts: attempt + 1 }),
            Err(err) if !err.retryable() => return Err(err),
            Err(err) => {
                if let Some(after) = err.retry_after {
                    tokio::time::sleep(after).await;
                }
                last_err = Some(err);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        ClassifiedError::new(crate::error::ErrorKind::Network, "retry schedule exhausted with no attempts")
    }))
}

//! Process-level graceful shutdown (spec §4.9).

use crate::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives the shutdown sequence: stop accepting new connections (the
/// caller's responsibility, typically by dropping the accept loop),
/// then tear down every active session with a bounded per-session
/// timeout, then exit.
pub struct Supervisor {
    registry: Arc<SessionRegistry>,
    teardown_timeout: Duration,
}

impl Supervisor {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry, teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT }
    }

    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    /// Tear down every active session, bounding each with
    /// `teardown_timeout`. Sessions that don't finish in time are
    /// abandoned (their resources will be reclaimed by process exit) but
    /// the shutdown sequence as a whole always converges.
    pub async fn shutdown(&self) -> usize {
        let ids = self.registry.all_ids();
        let total = ids.len();
        tracing::info!(sessions = total, "supervisor: beginning graceful shutdown");

        for id in ids {
            let registry = self.registry.clone();
            let outcome = tokio::time::timeout(self.teardown_timeout, async move {
                registry.delete(id).await;
            })
            .await;

            if outcome.is_err() {
                tracing::warn!(%id, "supervisor: teardown exceeded timeout, abandoning session");
                metrics::counter!("supervisor_teardown_timeouts_total").increment(1);
            }
        }

        let remaining = self.registry.count();
        tracing::info!(remaining, "supervisor: shutdown sequence complete");
        remaining
    }
}

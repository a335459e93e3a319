//! Maps connection -> session identity and owns lifecycle timers (spec
//! §4.2).

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voice_agent_core::{SessionId, SessionMeta};

const SESSION_MAX_AGE_MS: u64 = 3_600_000;
const SESSION_MAX_IDLE_MS: u64 = 300_000;
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Opaque handle identifying one inbound client connection, minted by the
/// server's accept loop before a `SessionId` exists for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub fn new() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A callback invoked when a session is deleted, cascading teardown into
/// STT/LLM/TTS engines and the Transport Hub (spec §4.2). Registered by
/// the orchestrator at startup.
pub type TeardownHook = Arc<dyn Fn(SessionId) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<RwLock<SessionMeta>>>,
    by_connection: DashMap<ConnectionId, SessionId>,
    connection_of: DashMap<SessionId, ConnectionId>,
    teardown_hooks: RwLock<Vec<TeardownHook>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            by_connection: DashMap::new(),
            connection_of: DashMap::new(),
            teardown_hooks: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback invoked (with the session id) every time a
    /// session is deleted, whether by explicit close, idle sweep, or
    /// supervisor shutdown.
    pub fn add_teardown_hook(&self, hook: TeardownHook) {
        self.teardown_hooks.write().push(hook);
    }

    /// Mint a new session for `connection` and register it IDLE.
    pub fn create(&self, connection: ConnectionId) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(id, Arc::new(RwLock::new(SessionMeta::new(id))));
        self.by_connection.insert(connection, id);
        self.connection_of.insert(id, connection);
        id
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<RwLock<SessionMeta>>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn get_by_connection(&self, connection: ConnectionId) -> Option<SessionId> {
        self.by_connection.get(&connection).map(|entry| *entry)
    }

    /// Bump `last_activity_ms` for `id`, a no-op if the session is gone.
    pub fn touch(&self, id: SessionId) {
        if let Some(meta) = self.sessions.get(&id) {
            meta.write().touch();
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn all_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    /// Remove `id` and fire every registered teardown hook. Idempotent:
    /// deleting an already-gone session runs no hooks and returns `false`.
    pub async fn delete(&self, id: SessionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if let Some((_, conn)) = self.connection_of.remove(&id) {
            self.by_connection.remove(&conn);
        }
        if !removed {
            return false;
        }

        let hooks: Vec<TeardownHook> = self.teardown_hooks.read().clone();
        for hook in hooks {
            hook(id).await;
        }
        true
    }

    /// Close and delete every session whose age exceeds one hour or whose
    /// idle time exceeds five minutes (spec §4.2).
    pub async fn sweep(&self) -> usize {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                let meta = entry.value().read();
                meta.age_ms() > SESSION_MAX_AGE_MS || meta.idle_ms() > SESSION_MAX_IDLE_MS
            })
            .map(|entry| *entry.key())
            .collect();

        for id in &expired {
            self.delete(*id).await;
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "session sweep removed expired sessions");
            metrics::counter!("session_sweep_removed_total").increment(expired.len() as u64);
        }
        expired.len()
    }

    /// Spawn the background sweep task; runs every five minutes until the
    /// returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                registry.sweep().await;
            }
        })
    }
}

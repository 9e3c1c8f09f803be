//! Session store for the HTTP transport
//!
//! One entry per connected client: its transport handle and server handle.
//! The map is private; all access goes through the store's methods.
//! Sessions nobody touches for a while are dropped by [`SessionStore::sweep_idle`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Transport side of a session
pub trait SessionTransport: Send + Sync {
    /// Assigned session id, if the transport has one yet
    fn session_id(&self) -> Option<String>;
    fn close(&self) -> anyhow::Result<()>;

    /// A live stream is attached; the session is never idle while true
    fn is_streaming(&self) -> bool {
        false
    }
}

/// Protocol server side of a session
pub trait SessionServer: Send + Sync {
    fn close(&self) -> anyhow::Result<()>;
}

pub struct Session<T: ?Sized, S: ?Sized> {
    pub id: String,
    pub transport: Arc<T>,
    pub server: Arc<S>,
    pub created_at: DateTime<Utc>,
    /// Last registration or lookup
    pub last_seen: Instant,
}

impl<T: ?Sized, S: ?Sized> Clone for Session<T, S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            transport: Arc::clone(&self.transport),
            server: Arc::clone(&self.server),
            created_at: self.created_at,
            last_seen: self.last_seen,
        }
    }
}

impl<T: ?Sized, S: ?Sized> std::fmt::Debug for Session<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Sessions keyed by id, generic over the transport and server handles
pub struct SessionStore<T: ?Sized, S: ?Sized> {
    sessions: Mutex<HashMap<String, Session<T, S>>>,
}

impl<T: SessionTransport + ?Sized, S: SessionServer + ?Sized> Default for SessionStore<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SessionTransport + ?Sized, S: SessionServer + ?Sized> SessionStore<T, S> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a session under the transport's id.
    ///
    /// No-op (returns `None`) when the transport has no id yet.
    pub fn register(&self, transport: Arc<T>, server: Arc<S>) -> Option<String> {
        let id = transport.session_id()?;
        let session = Session {
            id: id.clone(),
            transport,
            server,
            created_at: Utc::now(),
            last_seen: Instant::now(),
        };
        self.sessions.lock().insert(id.clone(), session);
        tracing::info!("Session created: {}", id);
        Some(id)
    }

    /// Look up a session, marking it as seen
    pub fn get(&self, id: &str) -> Option<Session<T, S>> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id)?;
        session.last_seen = Instant::now();
        Some(session.clone())
    }

    /// Remove a session and close both handles. Idempotent.
    ///
    /// Close failures are logged, never returned.
    pub fn remove(&self, id: &str) -> bool {
        let Some(session) = self.sessions.lock().remove(id) else {
            return false;
        };
        if let Err(e) = session.transport.close() {
            tracing::warn!("Failed to close transport for session {}: {}", id, e);
        }
        if let Err(e) = session.server.close() {
            tracing::warn!("Failed to close server for session {}: {}", id, e);
        }
        tracing::info!("Session removed: {}", id);
        true
    }

    pub fn close_all(&self) {
        let ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        for id in ids {
            self.remove(&id);
        }
    }

    /// Remove every session unseen for `max_idle` that has no live stream.
    /// Returns how many were removed.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<String> = self
            .sessions
            .lock()
            .values()
            .filter(|s| !s.transport.is_streaming() && s.last_seen.elapsed() >= max_idle)
            .map(|s| s.id.clone())
            .collect();

        let removed = expired.iter().filter(|id| self.remove(id)).count();
        if removed > 0 {
            tracing::info!("Expired {} idle sessions", removed);
        }
        removed
    }

    pub fn size(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Sweep `store` for idle sessions every `every` until the task is aborted
pub fn spawn_idle_sweeper<T, S>(
    store: Arc<SessionStore<T, S>>,
    max_idle: Duration,
    every: Duration,
) -> JoinHandle<()>
where
    T: SessionTransport + ?Sized + 'static,
    S: SessionServer + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.sweep_idle(max_idle);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTransport {
        id: Option<String>,
        closes: AtomicUsize,
        fail: bool,
        streaming: bool,
    }

    impl FakeTransport {
        fn new(id: Option<&str>, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                id: id.map(String::from),
                closes: AtomicUsize::new(0),
                fail,
                streaming: false,
            })
        }

        fn streaming(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: Some(id.to_string()),
                closes: AtomicUsize::new(0),
                fail: false,
                streaming: true,
            })
        }
    }

    impl SessionTransport for FakeTransport {
        fn session_id(&self) -> Option<String> {
            self.id.clone()
        }

        fn close(&self) -> anyhow::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("already closed")
            }
            Ok(())
        }

        fn is_streaming(&self) -> bool {
            self.streaming
        }
    }

    #[derive(Default)]
    struct FakeServer {
        closes: AtomicUsize,
    }

    impl SessionServer for FakeServer {
        fn close(&self) -> anyhow::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    type Store = SessionStore<FakeTransport, FakeServer>;

    #[test]
    fn test_register_and_get() {
        let store = Store::new();
        let id = store.register(FakeTransport::new(Some("abc"), false), Arc::new(FakeServer::default()));
        assert_eq!(id.as_deref(), Some("abc"));
        assert_eq!(store.size(), 1);
        assert_eq!(store.get("abc").map(|s| s.id), Some("abc".to_string()));
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn test_register_without_id_is_noop() {
        let store = Store::new();
        assert!(store
            .register(FakeTransport::new(None, false), Arc::new(FakeServer::default()))
            .is_none());
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_remove_closes_both_and_is_idempotent() {
        let store = Store::new();
        let transport = FakeTransport::new(Some("abc"), false);
        let server = Arc::new(FakeServer::default());
        store.register(transport.clone(), server.clone());

        assert!(store.remove("abc"));
        assert!(!store.remove("abc"));
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_close_failure_still_removes() {
        let store = Store::new();
        let server = Arc::new(FakeServer::default());
        store.register(FakeTransport::new(Some("abc"), true), server.clone());
        assert!(store.remove("abc"));
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
        assert!(store.get("abc").is_none());
    }

    #[test]
    fn test_close_all() {
        let store = Store::new();
        for id in ["a", "b", "c"] {
            store.register(FakeTransport::new(Some(id), false), Arc::new(FakeServer::default()));
        }
        store.close_all();
        assert_eq!(store.size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_get_remove() {
        let store = Arc::new(Store::new());

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let id = format!("session-{}", i);
                    store.register(FakeTransport::new(Some(&id), false), Arc::new(FakeServer::default()));
                    assert!(store.get(&id).is_some());
                    // Odd sessions are torn down again
                    if i % 2 == 1 {
                        assert!(store.remove(&id));
                        assert!(store.get(&id).is_none());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.size(), 32);
        assert!(store.get("session-0").is_some());
        assert!(store.get("session-1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_only_idle_sessions() {
        let store = Store::new();
        store.register(FakeTransport::new(Some("stale"), false), Arc::new(FakeServer::default()));
        store.register(FakeTransport::new(Some("busy"), false), Arc::new(FakeServer::default()));
        let listener = FakeTransport::streaming("listener");
        store.register(listener.clone(), Arc::new(FakeServer::default()));

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.get("busy").is_some());
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(store.sweep_idle(Duration::from_secs(60)), 1);
        assert!(store.get("stale").is_none());
        assert!(store.get("busy").is_some());
        assert!(store.get("listener").is_some());
        assert_eq!(listener.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweeper_runs_periodically() {
        let store = Arc::new(Store::new());
        let transport = FakeTransport::new(Some("abc"), false);
        store.register(transport.clone(), Arc::new(FakeServer::default()));

        let sweeper = spawn_idle_sweeper(
            Arc::clone(&store),
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        tokio::time::sleep(Duration::from_secs(45)).await;
        sweeper.abort();

        assert_eq!(store.size(), 0);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }
}

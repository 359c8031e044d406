//! Registry of live streaming sessions.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock, Weak},
    time::Instant,
};

use shellgate_core::SessionId;
use tokio::sync::mpsc;

/// Registry error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No live session has this id. Covers ids that never existed, ids
    /// whose stream already closed, and streams that are closing.
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session already registered: {0}")]
    AlreadyRegistered(SessionId),
}

struct SessionEntry<M> {
    inbound: mpsc::UnboundedSender<M>,
    opened_at: Instant,
}

/// Maps live session ids to the inbound queue of their stream.
///
/// The map is only reachable through `register`, `close` and `route`.
/// An entry exists exactly as long as the stream that registered it: the
/// [`SessionGuard`] returned by `register` removes it when dropped, and
/// there is no other removal path.
pub struct SessionRegistry<M> {
    sessions: RwLock<HashMap<SessionId, SessionEntry<M>>>,
}

impl<M> Default for SessionRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> SessionRegistry<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly minted session id.
    ///
    /// The id is routable as soon as this returns, so the caller must
    /// register before exposing the id to the client.
    ///
    /// # Errors
    /// Returns `AlreadyRegistered` if the id is live.
    pub fn register(
        self: &Arc<Self>,
        id: SessionId,
        inbound: mpsc::UnboundedSender<M>,
    ) -> Result<SessionGuard<M>, RegistryError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        sessions.insert(
            id,
            SessionEntry {
                inbound,
                opened_at: Instant::now(),
            },
        );
        let live = sessions.len();
        drop(sessions);

        tracing::info!(session_id = %id, live, "Session opened");
        Ok(SessionGuard {
            id,
            registry: Arc::downgrade(self),
        })
    }

    /// Remove a session. Returns whether it was live.
    pub fn close(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(entry) => {
                tracing::info!(
                    session_id = %id,
                    lifetime_ms = u64::try_from(entry.opened_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Session closed"
                );
                true
            }
            None => false,
        }
    }

    /// Deliver a message into a session's inbound queue.
    ///
    /// # Errors
    /// Returns `NotFound` if the id is not live or its stream is shutting
    /// down.
    pub fn route(&self, id: SessionId, message: M) -> Result<(), RegistryError> {
        let inbound = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|entry| entry.inbound.clone())
            .ok_or(RegistryError::NotFound(id))?;

        inbound.send(message).map_err(|_| {
            tracing::debug!(session_id = %id, "Inbound queue closed while routing");
            RegistryError::NotFound(id)
        })
    }

    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a session registered; unregisters it on drop.
///
/// Owned by the outbound stream, so client disconnects, write failures
/// and server shutdown all close the session the same way.
pub struct SessionGuard<M> {
    id: SessionId,
    registry: Weak<SessionRegistry<M>>,
}

impl<M> SessionGuard<M> {
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }
}

impl<M> fmt::Debug for SessionGuard<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard").field("id", &self.id).finish()
    }
}

impl<M> Drop for SessionGuard<M> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.close(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn open(
        registry: &Arc<SessionRegistry<String>>,
    ) -> (SessionGuard<String>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = registry.register(Uuid::new_v4(), tx).unwrap();
        (guard, rx)
    }

    #[test]
    fn test_route_immediately_after_register() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, mut rx) = open(&registry);

        registry.route(guard.id(), "first".to_string()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "first");
    }

    #[test]
    fn test_sessions_are_isolated() {
        let registry = Arc::new(SessionRegistry::new());
        let (a, mut rx_a) = open(&registry);
        let (b, mut rx_b) = open(&registry);

        registry.route(a.id(), "for-a".to_string()).unwrap();
        registry.route(b.id(), "for-b".to_string()).unwrap();

        assert_eq!(rx_a.try_recv().unwrap(), "for-a");
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), "for-b");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_unknown_id_is_not_found_repeatedly() {
        let registry: Arc<SessionRegistry<String>> = Arc::new(SessionRegistry::new());
        let id = Uuid::new_v4();

        for _ in 0..3 {
            assert_eq!(
                registry.route(id, "x".to_string()),
                Err(RegistryError::NotFound(id))
            );
        }
    }

    #[test]
    fn test_dropping_guard_unregisters_for_good() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, _rx) = open(&registry);
        let id = guard.id();
        assert!(registry.contains(id));

        drop(guard);

        assert!(registry.is_empty());
        for _ in 0..3 {
            assert_eq!(
                registry.route(id, "late".to_string()),
                Err(RegistryError::NotFound(id))
            );
        }
        assert!(!registry.close(id));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let registry = Arc::new(SessionRegistry::<String>::new());
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        let _guard = registry.register(id, tx.clone()).unwrap();

        assert_eq!(
            registry.register(id, tx).unwrap_err(),
            RegistryError::AlreadyRegistered(id)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_closed_inbound_queue_is_not_found() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, rx) = open(&registry);
        drop(rx);

        assert_eq!(
            registry.route(guard.id(), "x".to_string()),
            Err(RegistryError::NotFound(guard.id()))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_receive_only_their_messages() {
        let registry = Arc::new(SessionRegistry::<usize>::new());
        let mut handles = Vec::new();

        for n in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let guard = registry.register(Uuid::new_v4(), tx).unwrap();
                for _ in 0..10 {
                    registry.route(guard.id(), n).unwrap();
                    tokio::task::yield_now().await;
                }
                for _ in 0..10 {
                    assert_eq!(rx.recv().await, Some(n));
                }
                assert!(rx.try_recv().is_err());
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}

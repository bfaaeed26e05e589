//! Active-connection registry and the admission limit built on it.
//!
//! The command port only serves one client at a time: a second client that
//! connects while the first is active is told so and disconnected.
//! [`ConnectionRegistry`] tracks who is admitted; [`ClientLimit`] wraps any
//! [`ConnectionHandler`] and enforces the limit around it.
//!
//! Sessions run concurrently, so the registry is guarded by a mutex.  The lock
//! is only held for the map operation itself, never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::application::handler::{Admission, ConnectionHandler, HandlerError};
use crate::domain::identity::ConnectionId;

/// Rejection text sent by [`ClientLimit`] unless overridden.
pub const DEFAULT_REJECTION: &str = "There is already an active client";

/// Error type for registry admission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection limit of {max} reached")]
    Full { max: usize },
}

/// Thread-safe set of admitted connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    max_clients: Option<usize>,
    active: Mutex<HashMap<ConnectionId, Instant>>,
}

impl ConnectionRegistry {
    /// Creates a registry; `None` means no limit.
    pub fn new(max_clients: Option<usize>) -> Self {
        Self {
            max_clients,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// The configured limit.
    pub fn max_clients(&self) -> Option<usize> {
        self.max_clients
    }

    /// Admits `id` unless the limit is reached.
    ///
    /// Admitting an already-admitted id is a no-op success.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Full`] when `max_clients` connections are active.
    pub fn try_admit(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        let mut active = self.lock();
        if active.contains_key(id) {
            return Ok(());
        }
        if let Some(max) = self.max_clients {
            if active.len() >= max {
                return Err(RegistryError::Full { max });
            }
        }
        active.insert(id.clone(), Instant::now());
        Ok(())
    }

    /// Removes `id`; returns whether it was admitted.
    pub fn release(&self, id: &ConnectionId) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the admitted connections, oldest first.
    pub fn active(&self) -> Vec<ConnectionId> {
        let active = self.lock();
        let mut entries: Vec<(&ConnectionId, &Instant)> = active.iter().collect();
        entries.sort_by_key(|(_, since)| **since);
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Instant>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wraps a handler so that at most `max_clients` connections are admitted.
///
/// Rejected connections never reach the inner handler: neither
/// `connection_made`, `request_received` nor `connection_lost` is forwarded
/// for them.
pub struct ClientLimit<H> {
    inner: H,
    registry: Arc<ConnectionRegistry>,
    rejection: String,
}

impl<H: ConnectionHandler> ClientLimit<H> {
    /// Limits `inner` to `max_clients` concurrent connections.
    pub fn new(inner: H, max_clients: usize) -> Self {
        Self::with_registry(inner, Arc::new(ConnectionRegistry::new(Some(max_clients))))
    }

    /// Uses an existing registry, so the embedding application can inspect it.
    pub fn with_registry(inner: H, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            inner,
            registry,
            rejection: DEFAULT_REJECTION.to_string(),
        }
    }

    /// Replaces the text sent to rejected connections.
    pub fn with_rejection(mut self, rejection: impl Into<String>) -> Self {
        self.rejection = rejection.into();
        self
    }

    /// The registry tracking admitted connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

impl<H: ConnectionHandler> ConnectionHandler for ClientLimit<H> {
    fn connection_made(&self, id: &ConnectionId) -> Admission {
        match self.registry.try_admit(id) {
            Ok(()) => self.inner.connection_made(id),
            Err(e) => {
                info!("connection {id}: rejected ({e})");
                Admission::Reject(self.rejection.clone())
            }
        }
    }

    fn connection_lost(&self, id: &ConnectionId) {
        if self.registry.release(id) {
            self.inner.connection_lost(id);
        } else {
            debug!("connection {id}: lost before admission");
        }
    }

    fn request_received(&self, id: &ConnectionId, request: &str) -> Result<String, HandlerError> {
        self.inner.request_received(id, request)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handler::MockConnectionHandler;

    fn id(port: u16) -> ConnectionId {
        ConnectionId::new(format!("127.0.0.1:{port}").parse().unwrap())
    }

    // ── ConnectionRegistry ────────────────────────────────────────────────────

    #[test]
    fn test_unlimited_registry_admits_everyone() {
        let registry = ConnectionRegistry::new(None);
        for port in 1..=50 {
            registry.try_admit(&id(port)).unwrap();
        }
        assert_eq!(registry.len(), 50);
    }

    #[test]
    fn test_registry_rejects_when_full() {
        // Arrange
        let registry = ConnectionRegistry::new(Some(1));
        registry.try_admit(&id(1)).unwrap();

        // Act
        let result = registry.try_admit(&id(2));

        // Assert
        assert_eq!(result, Err(RegistryError::Full { max: 1 }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_max_clients_reports_configured_limit() {
        assert_eq!(ConnectionRegistry::new(Some(1)).max_clients(), Some(1));
        assert_eq!(ConnectionRegistry::new(None).max_clients(), None);
    }

    #[test]
    fn test_release_frees_the_slot() {
        let registry = ConnectionRegistry::new(Some(1));
        let first = id(1);
        registry.try_admit(&first).unwrap();

        assert!(registry.release(&first));
        assert!(registry.is_empty());
        assert_eq!(registry.try_admit(&id(2)), Ok(()));
    }

    #[test]
    fn test_release_of_unknown_id_returns_false() {
        let registry = ConnectionRegistry::new(Some(1));
        assert!(!registry.release(&id(9)));
    }

    #[test]
    fn test_readmitting_same_id_is_noop() {
        let registry = ConnectionRegistry::new(Some(1));
        let first = id(1);
        registry.try_admit(&first).unwrap();
        assert_eq!(registry.try_admit(&first), Ok(()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_active_lists_admitted_ids_oldest_first() {
        let registry = ConnectionRegistry::new(None);
        let (a, b) = (id(1), id(2));
        registry.try_admit(&a).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        registry.try_admit(&b).unwrap();
        assert_eq!(registry.active(), vec![a, b]);
    }

    #[test]
    fn test_registry_is_shared_across_threads() {
        let registry = Arc::new(ConnectionRegistry::new(Some(4)));
        let handles: Vec<_> = (0..16)
            .map(|port| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.try_admit(&id(port)).is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 4);
        assert_eq!(registry.len(), 4);
    }

    // ── ClientLimit ───────────────────────────────────────────────────────────

    #[test]
    fn test_client_limit_forwards_admitted_connection() {
        // Arrange
        let mut inner = MockConnectionHandler::new();
        inner
            .expect_connection_made()
            .times(1)
            .returning(|_| Admission::Greet("cameras".to_string()));
        inner
            .expect_request_received()
            .withf(|_, request| request == "ping")
            .times(1)
            .returning(|_, _| Ok("pong".to_string()));
        inner.expect_connection_lost().times(1).return_const(());
        let limit = ClientLimit::new(inner, 1);
        let first = id(1);

        // Act / Assert
        assert_eq!(
            limit.connection_made(&first),
            Admission::Greet("cameras".to_string())
        );
        assert_eq!(limit.request_received(&first, "ping").unwrap(), "pong");
        limit.connection_lost(&first);
        assert!(limit.registry().is_empty());
    }

    #[test]
    fn test_client_limit_rejects_second_client_without_calling_inner() {
        // Arrange: inner sees exactly one connect and one disconnect
        let mut inner = MockConnectionHandler::new();
        inner
            .expect_connection_made()
            .times(1)
            .returning(|_| Admission::Accept);
        inner.expect_connection_lost().times(1).return_const(());
        inner.expect_request_received().times(0);
        let limit = ClientLimit::new(inner, 1);
        let (first, second) = (id(1), id(2));

        // Act
        assert_eq!(limit.connection_made(&first), Admission::Accept);
        let verdict = limit.connection_made(&second);
        limit.connection_lost(&second);

        // Assert: the rejected client did not evict the active one
        assert_eq!(verdict, Admission::Reject(DEFAULT_REJECTION.to_string()));
        assert!(limit.registry().contains(&first));
        limit.connection_lost(&first);
    }

    #[test]
    fn test_client_limit_custom_rejection_text() {
        let mut inner = MockConnectionHandler::new();
        inner.expect_connection_made().returning(|_| Admission::Accept);
        let limit = ClientLimit::new(inner, 0).with_rejection("busy");
        assert_eq!(
            limit.connection_made(&id(1)),
            Admission::Reject("busy".to_string())
        );
    }
}

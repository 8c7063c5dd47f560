//! Connection registry.
//!
//! Tracks every socket an adapter opened so `close()` can tear them all down.
//! Each connection is represented by a cancellation token; the stream loops
//! select on it and drop the socket once it fires.
//!
//! Once closed, the registry refuses new registrations. A subscription racing
//! with `close()` therefore either gets registered first (and is cancelled by
//! the close) or is refused and drops its fresh socket itself.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use spotlink_domain::{ExchangeError, ExchangeResult};

/// Open connections of one adapter instance.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    closed: bool,
    next_id: u64,
    connections: Vec<(u64, String, CancellationToken)>,
}

impl ConnectionRegistry {
    /// Create an empty, open registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new connection.
    ///
    /// # Errors
    /// Returns `ExchangeError::SessionClosed` once `close()` has been called.
    pub fn register(self: &Arc<Self>, label: &str) -> ExchangeResult<Registration> {
        let mut state = self.state();
        if state.closed {
            return Err(ExchangeError::SessionClosed);
        }

        state.next_id += 1;
        let id = state.next_id;
        let token = CancellationToken::new();
        state.connections.push((id, label.to_string(), token.clone()));

        debug!(id, label, open = state.connections.len(), "Registered connection");

        Ok(Registration {
            id,
            token,
            registry: Arc::clone(self),
        })
    }

    /// Cancel every registered connection and refuse new ones.
    ///
    /// Idempotent. Does not wait for the stream loops to exit.
    pub fn close(&self) {
        let connections = {
            let mut state = self.state();
            state.closed = true;
            std::mem::take(&mut state.connections)
        };

        for (id, label, token) in connections {
            debug!(id, %label, "Closing connection");
            token.cancel();
        }
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Number of connections registered and not yet finished.
    pub fn open_connections(&self) -> usize {
        self.state().connections.len()
    }

    fn deregister(&self, id: u64) {
        self.state().connections.retain(|(conn_id, _, _)| *conn_id != id);
    }
}

/// A live registry entry, owned by the connection's read loop.
///
/// Dropping it cancels the token (stopping any sibling keep-alive loop) and
/// removes the entry, so finished streams do not accumulate.
#[derive(Debug)]
pub struct Registration {
    id: u64,
    token: CancellationToken,
    registry: Arc<ConnectionRegistry>,
}

impl Registration {
    /// Token cancelled when the registry closes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Registry-assigned id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.token.cancel();
        self.registry.deregister(self.id);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_cancels_all_connections() {
        let registry = ConnectionRegistry::new();
        let a = registry.register("quotes").unwrap();
        let b = registry.register("orders").unwrap();
        assert_eq!(registry.open_connections(), 2);

        registry.close();

        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
        assert_eq!(registry.open_connections(), 0);
        assert!(registry.is_closed());
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let conn = registry.register("quotes").unwrap();

        registry.close();
        registry.close();

        assert!(conn.token().is_cancelled());
    }

    #[test]
    fn test_register_after_close_is_refused() {
        let registry = ConnectionRegistry::new();
        registry.close();

        assert!(matches!(registry.register("late"), Err(ExchangeError::SessionClosed)));
    }

    #[test]
    fn test_dropping_registration_deregisters() {
        let registry = ConnectionRegistry::new();
        let conn = registry.register("quotes").unwrap();
        let _other = registry.register("orders").unwrap();

        let token = conn.token().clone();
        drop(conn);

        assert!(token.is_cancelled());
        assert_eq!(registry.open_connections(), 1);
    }

    #[test]
    fn test_concurrent_register_and_close() {
        let registry = ConnectionRegistry::new();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    if i == 4 {
                        registry.close();
                        None
                    } else {
                        registry.register("stream").ok()
                    }
                })
            })
            .collect();

        let registrations: Vec<Registration> =
            handles.into_iter().filter_map(|h| h.join().unwrap()).collect();

        // Every connection that made it in before the close was cancelled by it.
        assert!(registry.is_closed());
        assert!(registrations.iter().all(|r| r.token().is_cancelled()));
    }
}

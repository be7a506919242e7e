//! Registry of live connections owned by a [`WebSocketSession`].
//!
//! Sessions hold a [`Registration`] guard for as long as their socket is
//! open; the registry can close every live socket at once.
//!
//! [`WebSocketSession`]: crate::WebSocketSession

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::DEFAULT_CLOSE_GRACE;
use crate::ws::Connection;

/// Set of open connections, shared by clones.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    notify: Notify,
    close_grace: Duration,
}

/// Keeps a connection registered; unregisters it when dropped.
///
/// This gives the teardown path RAII semantics even if the owning task is
/// aborted.
pub struct Registration {
    inner: Arc<RegistryInner>,
    id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.inner.remove(&self.id);
    }
}

impl Registration {
    /// Id of the guarded connection.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unregisters now.
    pub fn release(self) {}
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: &str) -> bool {
        let (removed, now_empty) = {
            let mut connections = self.lock();
            let removed = connections.remove(id).is_some();
            (removed, connections.is_empty())
        };
        if removed {
            debug!(id = %id, "Connection unregistered");
        }
        if now_empty {
            self.notify.notify_waiters();
        }
        removed
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry with the default close grace period.
    pub fn new() -> Self {
        Self::with_close_grace(DEFAULT_CLOSE_GRACE)
    }

    /// Creates an empty registry whose [`close_all`](Self::close_all) waits
    /// at most `close_grace` per connection.
    pub fn with_close_grace(close_grace: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                close_grace,
            }),
        }
    }

    /// Adds a connection and returns the guard that keeps it registered.
    pub fn register(&self, connection: Arc<Connection>) -> Registration {
        let id = connection.id().to_string();
        self.inner.lock().insert(id.clone(), connection);
        debug!(id = %id, "Connection registered");
        Registration {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Removes a connection. Returns false if it was not registered.
    pub fn unregister(&self, id: &str) -> bool {
        self.inner.remove(id)
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Closes every registered connection and waits for each to confirm.
    ///
    /// Connections that do not confirm within the grace period are released
    /// anyway. Safe to call repeatedly or with nothing registered.
    pub async fn close_all(&self) {
        let connections: Vec<Arc<Connection>> = self.inner.lock().values().cloned().collect();
        if connections.is_empty() {
            debug!("No live connections to close");
            return;
        }

        info!(count = connections.len(), "Closing all live connections");
        let grace = self.inner.close_grace;
        join_all(connections.iter().map(|conn| conn.close(grace))).await;

        for conn in &connections {
            self.inner.remove(conn.id());
        }
        info!(count = connections.len(), "All live connections closed");
    }

    /// Waits until no connection is registered.
    ///
    /// Returns immediately if the registry is already empty.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.len())
            .field("close_grace", &self.inner.close_grace)
            .finish()
    }
}

//! Registry of live realtime connections.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;

/// A registered connection and the signal used to force it closed.
pub struct ConnectionEntry {
    pub user_id: String,
    pub revoke: Arc<Notify>,
}

/// Shared registry of all realtime connections, keyed by connection id.
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection after IDENTIFY. The returned handle fires when
    /// the connection must be closed.
    pub fn register(&self, connection_id: &str, user_id: &str) -> Arc<Notify> {
        let revoke = Arc::new(Notify::new());
        self.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                user_id: user_id.to_string(),
                revoke: revoke.clone(),
            },
        );
        revoke
    }

    pub fn unregister(&self, connection_id: &str) {
        self.connections.remove(connection_id);
    }

    /// Close every connection belonging to `user_id`. Returns how many were
    /// signalled.
    pub fn disconnect_user(&self, user_id: &str) -> usize {
        let mut count = 0;
        for entry in self.connections.iter() {
            if entry.user_id == user_id {
                // notify_one stores a permit if the loop is not parked yet.
                entry.revoke.notify_one();
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!(%user_id, connections = count, "revoking realtime connections");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn count_for_user(&self, user_id: &str) -> usize {
        self.connections
            .iter()
            .filter(|e| e.user_id == user_id)
            .count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

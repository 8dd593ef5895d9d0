//! Broadcast hub for publishing table changes to connected clients.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connection subscribes
//! and filters events locally by table subscription and row ownership.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use super::events::{ChangeKind, Table};

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// A row change broadcast to all realtime connections.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    pub table: Table,
    pub kind: ChangeKind,
    /// The profile that owns the row, used for customer visibility.
    pub owner_id: Option<String>,
    pub record: Value,
}

/// The global broadcast hub. Cloneable, stored in AppState.
#[derive(Clone)]
pub struct RealtimeBroadcast {
    sender: broadcast::Sender<Arc<BroadcastPayload>>,
}

impl RealtimeBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the broadcast channel. Each connection calls this once.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastPayload>> {
        self.sender.subscribe()
    }

    /// Dispatch a change to all connections.
    pub fn dispatch(&self, payload: BroadcastPayload) {
        // Err only means nobody is listening.
        let _ = self.sender.send(Arc::new(payload));
    }

    /// Serialize `record` and dispatch it as a change on `table`.
    pub fn publish<T: Serialize>(
        &self,
        table: Table,
        kind: ChangeKind,
        owner_id: Option<&str>,
        record: &T,
    ) {
        match serde_json::to_value(record) {
            Ok(record) => self.dispatch(BroadcastPayload {
                table,
                kind,
                owner_id: owner_id.map(str::to_string),
                record,
            }),
            Err(err) => {
                tracing::error!(?err, table = table.as_str(), "failed to serialize change");
            }
        }
    }
}

impl Default for RealtimeBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let hub = RealtimeBroadcast::new();
        let mut rx = hub.subscribe();
        hub.publish(
            Table::Files,
            ChangeKind::Insert,
            Some("usr_1"),
            &serde_json::json!({ "id": "fil_1" }),
        );

        let payload = rx.recv().await.unwrap();
        assert_eq!(payload.table, Table::Files);
        assert_eq!(payload.kind, ChangeKind::Insert);
        assert_eq!(payload.owner_id.as_deref(), Some("usr_1"));
        assert_eq!(payload.record["id"], "fil_1");
    }

    #[test]
    fn dispatch_without_receivers_is_fine() {
        let hub = RealtimeBroadcast::new();
        hub.publish(Table::Backups, ChangeKind::Update, None, &"x");
    }
}

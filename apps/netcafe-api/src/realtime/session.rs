//! Per-connection realtime state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::models::profile::ROLE_ADMIN;

use super::events::Table;
use super::fanout::BroadcastPayload;

/// State for a single WebSocket connection.
pub struct RealtimeSession {
    /// Unique connection identifier (`rtc_` prefixed ULID).
    pub connection_id: String,
    pub user_id: String,
    pub role: String,
    tables: Mutex<HashSet<Table>>,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl RealtimeSession {
    pub fn new(connection_id: String, user_id: String, role: String, tables: &[Table]) -> Self {
        Self {
            connection_id,
            user_id,
            role,
            tables: Mutex::new(tables.iter().copied().collect()),
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn subscribe(&self, tables: &[Table]) {
        self.tables.lock().extend(tables.iter().copied());
    }

    pub fn unsubscribe(&self, tables: &[Table]) {
        let mut current = self.tables.lock();
        for table in tables {
            current.remove(table);
        }
    }

    /// Current subscriptions as table names, sorted for stable output.
    pub fn table_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tables.lock().iter().map(|t| t.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Whether this connection should receive `payload`.
    ///
    /// Admins see every subscribed table. Customers see workstation
    /// availability and rows they own, never backups.
    pub fn should_receive(&self, payload: &BroadcastPayload) -> bool {
        if !self.tables.lock().contains(&payload.table) {
            return false;
        }
        if self.role == ROLE_ADMIN {
            return true;
        }
        match payload.table {
            Table::Workstations => true,
            Table::Backups => false,
            _ => payload.owner_id.as_deref() == Some(self.user_id.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::ChangeKind;

    fn payload(table: Table, owner: Option<&str>) -> BroadcastPayload {
        BroadcastPayload {
            table,
            kind: ChangeKind::Insert,
            owner_id: owner.map(str::to_string),
            record: serde_json::Value::Null,
        }
    }

    #[test]
    fn customer_only_sees_own_rows() {
        let s = RealtimeSession::new(
            "rtc_1".into(),
            "usr_a".into(),
            "customer".into(),
            &Table::ALL,
        );
        assert!(s.should_receive(&payload(Table::Files, Some("usr_a"))));
        assert!(!s.should_receive(&payload(Table::Files, Some("usr_b"))));
        assert!(!s.should_receive(&payload(Table::Sessions, None)));
        assert!(s.should_receive(&payload(Table::Workstations, None)));
        assert!(!s.should_receive(&payload(Table::Backups, Some("usr_a"))));
    }

    #[test]
    fn admin_sees_everything_subscribed() {
        let s = RealtimeSession::new(
            "rtc_1".into(),
            "usr_admin".into(),
            "admin".into(),
            &[Table::Backups, Table::Sessions],
        );
        assert!(s.should_receive(&payload(Table::Backups, None)));
        assert!(s.should_receive(&payload(Table::Sessions, Some("usr_x"))));
        assert!(!s.should_receive(&payload(Table::Files, Some("usr_x"))));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let s = RealtimeSession::new("rtc_1".into(), "usr_a".into(), "customer".into(), &[]);
        assert!(!s.should_receive(&payload(Table::Workstations, None)));
        s.subscribe(&[Table::Workstations, Table::Files]);
        assert_eq!(s.table_names(), vec!["files", "workstations"]);
        assert!(s.should_receive(&payload(Table::Workstations, None)));
        s.unsubscribe(&[Table::Workstations]);
        assert!(!s.should_receive(&payload(Table::Workstations, None)));
    }

    #[test]
    fn sequence_increments() {
        let s = RealtimeSession::new("rtc_1".into(), "usr_a".into(), "customer".into(), &[]);
        assert_eq!(s.next_seq(), 1);
        assert_eq!(s.next_seq(), 2);
    }
}

//! Realtime opcodes, table names, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_SUBSCRIBE: u8 = 3;
pub const OP_UNSUBSCRIBE: u8 = 4;
pub const OP_HEARTBEAT_ACK: u8 = 6;
pub const OP_RECONNECT: u8 = 7;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Tables whose changes are published on the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Sessions,
    Files,
    Profiles,
    Workstations,
    FileLogs,
    Backups,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Sessions,
        Table::Files,
        Table::Profiles,
        Table::Workstations,
        Table::FileLogs,
        Table::Backups,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Sessions => "sessions",
            Table::Files => "files",
            Table::Profiles => "profiles",
            Table::Workstations => "workstations",
            Table::FileLogs => "file_logs",
            Table::Backups => "backups",
        }
    }

    pub fn parse(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

/// Expand a client-supplied table list. `"*"` selects every table.
pub fn parse_tables(names: &[String]) -> Result<Vec<Table>, String> {
    let mut tables = Vec::new();
    for name in names {
        if name == "*" {
            return Ok(Table::ALL.to_vec());
        }
        let table = Table::parse(name).ok_or_else(|| format!("Unknown table: {name}"))?;
        if !tables.contains(&table) {
            tables.push(table);
        }
    }
    Ok(tables)
}

/// Row change kinds, used as the dispatch event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl RealtimeMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a RECONNECT message (op=7) telling the client to log in again.
    pub fn reconnect(reason: &str) -> Self {
        Self {
            op: OP_RECONNECT,
            t: None,
            s: None,
            d: serde_json::json!({ "reason": reason }),
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub ticket: String,
    #[serde(default)]
    pub tables: Vec<String>,
}

/// Body of SUBSCRIBE and UNSUBSCRIBE.
#[derive(Debug, Deserialize)]
pub struct SubscriptionPayload {
    pub tables: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

/// Dispatch event names that are not row changes.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const SUBSCRIPTIONS: &'static str = "SUBSCRIPTIONS";
}

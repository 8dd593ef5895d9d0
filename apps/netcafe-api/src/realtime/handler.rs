//! IDENTIFY handling: ticket validation and the READY payload.

use netcafe_common::id::{prefix, prefixed_ulid};

use crate::auth::tokens;
use crate::models::profile;
use crate::AppState;

use super::events::{EventName, RealtimeMessage, Table};
use super::session::RealtimeSession;

/// Heartbeat interval sent to clients in the READY payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 41250;

/// Process an IDENTIFY opcode. Returns a (`RealtimeSession`, READY message) on success.
pub async fn handle_identify(
    state: &AppState,
    ticket: &str,
    tables: Vec<Table>,
) -> Result<(RealtimeSession, RealtimeMessage), &'static str> {
    // Consume the ticket (single-use).
    let ticket_data = tokens::consume_realtime_ticket(state.kv.as_ref(), ticket)
        .await
        .map_err(|_| "Ticket lookup failed")?
        .ok_or("Invalid or expired ticket")?;

    let mut conn = state.db.get().await.map_err(|_| "Database unavailable")?;

    let user = profile::find(&mut conn, &ticket_data.user_id)
        .await
        .map_err(|_| "Profile lookup failed")?
        .ok_or("User not found")?;

    if !user.is_active() {
        return Err("Account is not active");
    }

    let connection_id = prefixed_ulid(prefix::CONNECTION);
    let session = RealtimeSession::new(connection_id, user.id.clone(), user.role.clone(), &tables);

    let ready_data = serde_json::json!({
        "connection_id": session.connection_id,
        "user": {
            "id": user.id,
            "username": user.username,
            "full_name": user.full_name,
            "role": user.role,
        },
        "tables": session.table_names(),
        "heartbeat_interval": HEARTBEAT_INTERVAL_MS,
    });

    let seq = session.next_seq();
    let ready_msg = RealtimeMessage::dispatch(EventName::READY, seq, ready_data);

    Ok((session, ready_msg))
}

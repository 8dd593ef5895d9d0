//! Access token, refresh token, and realtime ticket management.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Opaque token generation
// ---------------------------------------------------------------------------

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

async fn store_json<T: Serialize>(
    kv: &dyn KeyValueStore,
    key: &str,
    data: &T,
    ttl_secs: u64,
) -> Result<(), ApiError> {
    let value = serde_json::to_string(data).map_err(|_| ApiError::internal("serialization"))?;
    kv.set_ex(key, &value, ttl_secs).await
}

async fn load_json<T: DeserializeOwned>(
    kv: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, ApiError> {
    match kv.get(key).await? {
        Some(v) => serde_json::from_str(&v)
            .map(Some)
            .map_err(|_| ApiError::internal("corrupt token data")),
        None => Ok(None),
    }
}

/// Read and delete in one step, for single-use tokens.
async fn consume_json<T: DeserializeOwned>(
    kv: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, ApiError> {
    let data = load_json(kv, key).await?;
    if data.is_some() {
        kv.del(key).await?;
    }
    Ok(data)
}

// ---------------------------------------------------------------------------
// Access token, 1-hour TTL
// ---------------------------------------------------------------------------

/// Access token TTL in seconds (1 hour).
pub const ACCESS_TTL_SECS: u64 = 3600;

/// Data stored alongside an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessData {
    pub user_id: String,
    pub role: String,
    /// The workstation session opened by the login that issued this token.
    #[serde(default)]
    pub session_id: Option<String>,
}

pub fn generate_access_token() -> String {
    generate_opaque_token("nat", 32)
}

pub async fn store_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
    data: &AccessData,
) -> Result<(), ApiError> {
    store_json(kv, &format!("netcafe:nat:{token}"), data, ACCESS_TTL_SECS).await
}

pub async fn lookup_access_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<AccessData>, ApiError> {
    load_json(kv, &format!("netcafe:nat:{token}")).await
}

pub async fn revoke_access_token(kv: &dyn KeyValueStore, token: &str) -> Result<(), ApiError> {
    kv.del(&format!("netcafe:nat:{token}")).await
}

// ---------------------------------------------------------------------------
// Refresh token, 30-day TTL, single-use rotation
// ---------------------------------------------------------------------------

/// Refresh token TTL in seconds (30 days).
pub const REFRESH_TTL_SECS: u64 = 30 * 24 * 3600;

pub fn generate_refresh_token() -> String {
    generate_opaque_token("nrt", 32)
}

/// Refresh tokens carry the same data as the access token they rotate.
pub async fn store_refresh_token(
    kv: &dyn KeyValueStore,
    token: &str,
    data: &AccessData,
) -> Result<(), ApiError> {
    store_json(kv, &format!("netcafe:nrt:{token}"), data, REFRESH_TTL_SECS).await
}

pub async fn consume_refresh_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<AccessData>, ApiError> {
    consume_json(kv, &format!("netcafe:nrt:{token}")).await
}

// ---------------------------------------------------------------------------
// Realtime ticket, 30-second TTL, single-use
// ---------------------------------------------------------------------------

/// Realtime ticket TTL in seconds.
pub const REALTIME_TICKET_TTL_SECS: u64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct RealtimeTicketData {
    pub user_id: String,
}

pub fn generate_realtime_ticket() -> String {
    generate_opaque_token("rtt", 32)
}

pub async fn store_realtime_ticket(
    kv: &dyn KeyValueStore,
    ticket: &str,
    data: &RealtimeTicketData,
) -> Result<(), ApiError> {
    store_json(
        kv,
        &format!("netcafe:rtt:{ticket}"),
        data,
        REALTIME_TICKET_TTL_SECS,
    )
    .await
}

pub async fn consume_realtime_ticket(
    kv: &dyn KeyValueStore,
    ticket: &str,
) -> Result<Option<RealtimeTicketData>, ApiError> {
    consume_json(kv, &format!("netcafe:rtt:{ticket}")).await
}

/// Issue and store a fresh realtime ticket for `user_id`.
pub async fn issue_realtime_ticket(
    kv: &dyn KeyValueStore,
    user_id: &str,
) -> Result<String, ApiError> {
    let ticket = generate_realtime_ticket();
    store_realtime_ticket(
        kv,
        &ticket,
        &RealtimeTicketData {
            user_id: user_id.to_string(),
        },
    )
    .await?;
    Ok(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::MemoryStore;

    #[test]
    fn opaque_token_shape() {
        let token = generate_access_token();
        assert!(token.starts_with("nat_"));
        // 32 bytes base64url without padding is 43 chars.
        assert_eq!(token.len(), 4 + 43);
        assert_ne!(token, generate_access_token());
    }

    #[tokio::test]
    async fn refresh_token_is_single_use() {
        let kv = MemoryStore::new();
        let token = generate_refresh_token();
        let data = AccessData {
            user_id: "usr_1".to_string(),
            role: "customer".to_string(),
            session_id: None,
        };
        store_refresh_token(&kv, &token, &data).await.unwrap();

        let first = consume_refresh_token(&kv, &token).await.unwrap();
        assert_eq!(first.unwrap().user_id, "usr_1");
        assert!(consume_refresh_token(&kv, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_access_token_is_gone() {
        let kv = MemoryStore::new();
        let token = generate_access_token();
        let data = AccessData {
            user_id: "usr_1".to_string(),
            role: "admin".to_string(),
            session_id: Some("ses_1".to_string()),
        };
        store_access_token(&kv, &token, &data).await.unwrap();
        assert!(lookup_access_token(&kv, &token).await.unwrap().is_some());

        revoke_access_token(&kv, &token).await.unwrap();
        assert!(lookup_access_token(&kv, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn realtime_ticket_consumed_once() {
        let kv = MemoryStore::new();
        let ticket = issue_realtime_ticket(&kv, "usr_9").await.unwrap();
        assert!(ticket.starts_with("rtt_"));
        let data = consume_realtime_ticket(&kv, &ticket).await.unwrap().unwrap();
        assert_eq!(data.user_id, "usr_9");
        assert!(consume_realtime_ticket(&kv, &ticket).await.unwrap().is_none());
    }
}

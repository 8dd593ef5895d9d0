use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ApiError;

/// Abstraction over a key-value store used for access tokens, refresh tokens
/// and realtime tickets.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    async fn del(&self, key: &str) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Every this many writes, expired entries nobody read are swept out.
const PURGE_EVERY_WRITES: usize = 128;

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    writes_since_purge: usize,
}

/// Process-local store. Expired entries are dropped on read and swept
/// periodically on write, so unread tickets and tokens do not accumulate.
pub struct MemoryStore {
    data: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Entries::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        data.writes_since_purge += 1;
        if data.writes_since_purge >= PURGE_EVERY_WRITES {
            data.map.retain(|_, entry| entry.expires_at > now);
            data.writes_since_purge = 0;
        }
        data.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let mut data = self.data.lock();
        match data.map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                data.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), ApiError> {
        self.data.lock().map.remove(key);
        Ok(())
    }
}

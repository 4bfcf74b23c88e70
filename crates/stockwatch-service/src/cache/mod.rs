//! Key-value caching with per-entry TTLs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub mod snapshot;

pub use snapshot::SnapshotCache;

/// Minimal TTL cache capability. Values are opaque strings.
#[async_trait]
pub trait TtlCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
    async fn delete(&self, key: &str);
}

/// Process-local [`TtlCache`]. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Returns the live value for `key`, dropping it first if it expired by
/// `now`. A `set` may land between the read and write locks, so expiry is
/// checked again here.
fn take_live(
    entries: &mut HashMap<String, (Instant, String)>,
    key: &str,
    now: Instant,
) -> Option<String> {
    match entries.get(key) {
        Some((expires_at, value)) if now < *expires_at => Some(value.clone()),
        Some(_) => {
            entries.remove(key);
            None
        }
        None => None,
    }
}

#[async_trait]
impl TtlCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some((expires_at, value)) if Instant::now() < *expires_at => {
                    return Some(value.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        take_live(&mut entries, key, Instant::now())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (expires_at, value));
    }

    async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

//! In-memory cache backend (default, thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding.
//! Automatically handles TTL expiration on access.

use super::CacheBackend;
use crate::error::Result;
use crate::key::glob_match;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        CacheEntry { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// Thread-safe async in-memory cache backend.
///
/// Supports native glob deletion, so it can sit under either client kind.
/// Expiry uses the Tokio clock, which lets tests drive TTLs with
/// `tokio::time::pause`.
///
/// # Example
///
/// ```no_run
/// use cachegate::backend::{InMemoryBackend, CacheBackend};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///
///     backend.set("app:user:1", b"alice".to_vec(), Some(Duration::from_secs(300))).await?;
///     backend.set("app:user:2", b"bob".to_vec(), None).await?;
///
///     let removed = backend.delete_matching("app:user:*").await?;
///     assert_eq!(removed, 2);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryBackend {
    /// Create a new in-memory cache backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.store.iter().filter(|entry| !entry.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, unordered.
    pub fn keys(&self) -> Vec<String> {
        self.store
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        // Drop the expired entry if there was one
        self.store.remove(key);
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::new(value, ttl);
        self.store.insert(key.to_string(), entry);

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.store.remove(*key);
        }

        debug!("✓ InMemory MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let mut removed = 0u64;
        self.store.retain(|key, _| {
            let matched = glob_match(pattern, key);
            if matched {
                removed += 1;
            }
            !matched
        });

        debug!("✓ InMemory DELETE MATCHING {} -> {} keys", pattern, removed);
        Ok(removed)
    }

    fn supports_patterns(&self) -> bool {
        true
    }
}

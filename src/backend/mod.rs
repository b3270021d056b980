//! Raw byte stores underneath the cache clients.
//!
//! A backend knows nothing about key prefixes, value encoding or the key
//! index. Clients in [`crate::client`] layer those on top.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "memcached")]
pub mod memcached;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::InMemoryBackend;
#[cfg(feature = "memcached")]
pub use memcached::{MemcachedBackend, MemcachedConfig};
#[cfg(feature = "redis")]
pub use redis::{RedisBackend, RedisConfig};

/// Trait for cache backend implementations.
///
/// **IMPORTANT:** All methods use `&self` instead of `&mut self` to allow concurrent access.
/// Backend implementations should use interior mutability (RwLock, Mutex, or external storage).
///
/// **ASYNC:** All methods return `Send` futures so clients generic over a
/// backend can be shared across tasks. Implementations may use `async fn`.
pub trait CacheBackend: Send + Sync + Clone + 'static {
    /// Retrieve value from cache by key.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value found in cache
    /// - `Ok(None)` - Cache miss (key not found or expired)
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs (connection lost, etc.)
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store value in cache with optional TTL.
    ///
    /// # Arguments
    /// - `key`: Fully-qualified cache key
    /// - `value`: Encoded bytes
    /// - `ttl`: Time-to-live. None = use backend default or infinite
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove value from cache. Removing a missing key succeeds.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Bulk delete operation.
    ///
    /// Default implementation calls `delete()` for each key, stopping at the
    /// first failure.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn mdelete(&self, keys: &[&str]) -> impl Future<Output = Result<()>> + Send {
        async move {
            for key in keys {
                self.delete(key).await?;
            }
            Ok(())
        }
    }

    /// Delete every key matching a glob (`*`, `?`, backslash escapes).
    ///
    /// Only stores with native pattern support implement this. Returns the
    /// number of keys removed.
    ///
    /// # Errors
    /// Returns `Error::NotImplemented` by default.
    fn delete_matching(&self, pattern: &str) -> impl Future<Output = Result<u64>> + Send {
        let message = format!("pattern delete '{}' not supported by this backend", pattern);
        async move { Err(crate::error::Error::NotImplemented(message)) }
    }

    /// Whether `delete_matching` is implemented.
    fn supports_patterns(&self) -> bool {
        false
    }

    /// Health check - verify backend is accessible.
    ///
    /// Used by the connection supervisor as its connect probe.
    ///
    /// # Errors
    /// Returns `Err` if backend is not accessible
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }
}

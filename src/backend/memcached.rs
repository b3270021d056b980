//! Memcached cache backend implementation.
//!
//! The Memcached protocol has no wildcard delete; put an
//! [`IndexedClient`](crate::client::IndexedClient) on top of this backend to
//! get pattern invalidation.

use super::CacheBackend;
use crate::error::{Error, Result};
use async_memcached::AsciiProtocol;
use deadpool_memcached::{Manager, Object, Pool};
use std::time::Duration;

/// Default Memcached connection pool size.
/// Override with MEMCACHED_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Key read by the health probe. Never written.
const HEALTH_CHECK_KEY: &str = "__cachegate_health_check__";

/// Configuration for Memcached backend.
#[derive(Clone, Debug)]
pub struct MemcachedConfig {
    pub servers: Vec<String>, // e.g., ["localhost:11211", "cache2:11211"]
    pub connection_timeout: Duration,
    pub pool_size: u32,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            servers: vec!["localhost:11211".to_string()],
            connection_timeout: Duration::from_secs(5),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Memcached backend with connection pooling and async operations.
///
/// # Example
///
/// ```no_run
/// # use cachegate::backend::{MemcachedBackend, MemcachedConfig, CacheBackend};
/// # use cachegate::error::Result;
/// # async fn example() -> Result<()> {
/// let config = MemcachedConfig {
///     servers: vec!["localhost:11211".to_string()],
///     ..Default::default()
/// };
///
/// let backend = MemcachedBackend::new(config).await?;
/// backend.set("key", b"value".to_vec(), None).await?;
/// let value = backend.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemcachedBackend {
    pool: Pool,
    connection_timeout: Duration,
}

impl MemcachedBackend {
    /// Create new Memcached backend from configuration.
    ///
    /// The pool connects lazily: an unreachable server is reported by the
    /// first operation or health check, not here.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if no server is given or the pool cannot be built.
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        // deadpool-memcached Manager takes a single server address
        let addr = config
            .servers
            .first()
            .ok_or_else(|| Error::ConfigError("No memcached servers specified".to_string()))?
            .clone();

        if config.servers.len() > 1 {
            warn!(
                "Memcached backend uses only the first of {} servers ({})",
                config.servers.len(),
                addr
            );
        }

        let manager = Manager::new(addr.clone());

        let pool = Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Memcached backend initialized with server: {} (pool size: {})",
            addr, config.pool_size
        );

        Ok(MemcachedBackend {
            pool,
            connection_timeout: config.connection_timeout,
        })
    }

    /// Create from server address directly.
    ///
    /// Pool size is determined by:
    /// 1. `MEMCACHED_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub async fn from_server(addr: String) -> Result<Self> {
        let pool_size = std::env::var("MEMCACHED_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let config = MemcachedConfig {
            servers: vec![addr],
            pool_size,
            ..Default::default()
        };
        Self::new(config).await
    }

    async fn connection(&self) -> Result<Object> {
        match tokio::time::timeout(self.connection_timeout, self.pool.get()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(Error::BackendError(format!(
                "Failed to get Memcached connection: {}",
                e
            ))),
            Err(_) => Err(Error::BackendError(format!(
                "Timed out after {:?} waiting for Memcached connection",
                self.connection_timeout
            ))),
        }
    }
}

impl CacheBackend for MemcachedBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        match conn.get(key).await {
            Ok(Some(value)) => {
                debug!("✓ Memcached GET {} -> HIT", key);
                Ok(value.data)
            }
            Ok(None) => {
                debug!("✓ Memcached GET {} -> MISS", key);
                Ok(None)
            }
            Err(e) => Err(Error::BackendError(format!(
                "Memcached GET failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;

        // Values < 2592000 (30 days) are interpreted as seconds from now
        // None = item never expires (but may still be evicted when cache is full)
        let expiration = ttl.map(|d| d.as_secs().max(1) as i64);

        conn.set(key, value.as_slice(), expiration, None)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Memcached SET failed for key {}: {}", key, e))
            })?;

        if let Some(d) = ttl {
            debug!("✓ Memcached SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ Memcached SET {}", key);
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        match conn.delete(key).await {
            Ok(()) => {
                debug!("✓ Memcached DELETE {}", key);
                Ok(())
            }
            // NOT_FOUND is a successful delete of an absent key
            Err(e) if e.to_string().to_lowercase().contains("not found") => {
                debug!("✓ Memcached DELETE {} (absent)", key);
                Ok(())
            }
            Err(e) => Err(Error::BackendError(format!(
                "Memcached DELETE failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;

        conn.get(HEALTH_CHECK_KEY)
            .await
            .map(|_| true)
            .map_err(|e| Error::BackendError(format!("Memcached health probe failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memcached_config_default() {
        let config = MemcachedConfig::default();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0], "localhost:11211");
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
    }

    #[tokio::test]
    async fn test_memcached_no_servers_is_config_error() {
        let config = MemcachedConfig {
            servers: vec![],
            ..Default::default()
        };

        let result = MemcachedBackend::new(config).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    // Integration tests - require running memcached server
    // Run with: cargo test --features memcached -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_memcached_backend_set_get_delete() {
        let backend = MemcachedBackend::from_server("localhost:11211".to_string())
            .await
            .expect("Failed to create backend");

        backend
            .set("cg_test_key", b"test_value".to_vec(), None)
            .await
            .expect("Failed to set");

        let result = backend.get("cg_test_key").await.expect("Failed to get");
        assert_eq!(result, Some(b"test_value".to_vec()));

        backend.delete("cg_test_key").await.expect("Failed to delete");
        backend
            .delete("cg_test_key")
            .await
            .expect("Deleting an absent key succeeds");
        assert_eq!(backend.get("cg_test_key").await.expect("get"), None);
    }

    #[tokio::test]
    #[ignore]
    async fn test_memcached_backend_health_check() {
        let backend = MemcachedBackend::from_server("localhost:11211".to_string())
            .await
            .expect("Failed to create backend");

        assert!(backend.health_check().await.expect("Failed to check health"));
        assert!(!backend.supports_patterns());
    }
}

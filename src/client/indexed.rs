//! Client for stores without native key matching.
//!
//! Every written key is recorded in a [`KeyIndex`] persisted under the
//! reserved key `<prefix><sep>system:keys`. Wildcard deletes are resolved
//! against that index.
//!
//! The index is read, modified and written back as one document, so two
//! concurrent updates would lose one of the changes. A per-client async
//! mutex serializes those updates. Writers in other processes sharing the
//! same prefix are not coordinated.

use super::CacheClient;
use crate::backend::CacheBackend;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::index::KeyIndex;
use crate::key::{segments, KeyPattern};
use crate::serialization::Codec;
use crate::supervisor::{ConnectionEvent, ConnectionSupervisor, SupervisorHandle, SupervisorStatus};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// Prefixing, supervised client that maintains a key index.
///
/// Construction spawns a [`ConnectionSupervisor`] for the backend; dropping
/// the client stops it.
///
/// # Example
///
/// ```no_run
/// # #[cfg(feature = "memcached")]
/// # use cachegate::backend::{MemcachedBackend, MemcachedConfig};
/// # #[cfg(feature = "memcached")]
/// # use cachegate::client::{CacheClient, IndexedClient};
/// # #[cfg(feature = "memcached")]
/// # use cachegate::config::ClientConfig;
/// # #[cfg(feature = "memcached")]
/// # use std::time::Duration;
/// # #[cfg(feature = "memcached")]
/// # async fn example() -> cachegate::Result<()> {
/// let backend = MemcachedBackend::new(MemcachedConfig::default()).await?;
/// let client = IndexedClient::new(backend, ClientConfig::default().with_key_prefix("portal"))?;
///
/// client.set("themes:1:dark", b"{}".to_vec(), Duration::from_secs(60)).await?;
/// client.delete("themes:1:*", true).await?;
/// # Ok(())
/// # }
/// ```
pub struct IndexedClient<B: CacheBackend> {
    backend: B,
    config: ClientConfig,
    index_lock: Mutex<()>,
    supervisor: SupervisorHandle,
}

impl<B: CacheBackend> IndexedClient<B> {
    /// Wrap a backend and start supervising its connection.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the configuration is invalid or no
    /// Tokio runtime is running.
    pub fn new(backend: B, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let supervisor = ConnectionSupervisor::spawn(backend.clone(), &config)?;

        info!(
            "✓ Indexed client ready (index key: {})",
            config.key_storage_name()
        );

        Ok(IndexedClient {
            backend,
            config,
            index_lock: Mutex::new(()),
            supervisor,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    /// Current persisted index.
    ///
    /// A missing or unreadable index document reads as empty.
    ///
    /// # Errors
    /// Returns `Err` if the backend read fails.
    pub async fn load_index(&self) -> Result<KeyIndex> {
        let storage_key = self.config.key_storage_name();

        match self.backend.get(&storage_key).await? {
            None => Ok(KeyIndex::new()),
            Some(bytes) => match KeyIndex::from_bytes(&bytes) {
                Ok(index) => Ok(index),
                Err(e) => {
                    warn!("Discarding unreadable key index {}: {}", storage_key, e);
                    Ok(KeyIndex::new())
                }
            },
        }
    }

    async fn store_index(&self, index: &KeyIndex) -> Result<()> {
        let bytes = index.to_bytes()?;
        self.backend
            .set(
                &self.config.key_storage_name(),
                bytes,
                Some(self.config.index_ttl),
            )
            .await
    }

    async fn record_key(&self, key: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;

        let mut index = self.load_index().await?;
        index.insert(&segments(key, &self.config.key_separator), key);
        self.store_index(&index).await
    }

    fn reject_reserved(&self, key: &str) -> Result<()> {
        let reserved = self.config.build_key(key) == self.config.key_storage_name();
        if reserved {
            return Err(Error::ConfigError(format!(
                "'{}' is reserved for the key index",
                key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<B: CacheBackend> CacheClient for IndexedClient<B> {
    fn name(&self) -> &str {
        "indexed"
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.reject_reserved(key)?;

        self.backend
            .set(&self.config.build_key(key), value, Some(ttl))
            .await?;
        self.record_key(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.get(&self.config.build_key(key)).await
    }

    async fn delete(&self, key: &str, is_pattern: bool) -> Result<()> {
        let separator = &self.config.key_separator;
        let pattern = if is_pattern {
            KeyPattern::parse(key, separator)
        } else {
            KeyPattern::Exact(segments(key, separator).into_iter().map(String::from).collect())
        };

        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index().await?;

        match &pattern {
            KeyPattern::Exact(_) => {
                self.backend.delete(&self.config.build_key(key)).await?;
            }
            KeyPattern::Wildcard(_) => {
                let full_keys: Vec<String> = index
                    .find(&pattern)
                    .iter()
                    .map(|k| self.config.build_key(k))
                    .collect();
                let refs: Vec<&str> = full_keys.iter().map(String::as_str).collect();
                self.backend.mdelete(&refs).await?;
                debug!("Indexed delete {} removed {} keys", key, full_keys.len());
            }
        }

        index.remove(&pattern);
        self.store_index(&index).await
    }

    fn codec(&self) -> Codec {
        self.config.codec
    }

    fn connection_events(&self) -> Option<broadcast::Receiver<ConnectionEvent>> {
        Some(self.supervisor.subscribe())
    }

    fn connection_status(&self) -> Option<SupervisorStatus> {
        Some(self.supervisor.status())
    }

    fn report_issue(&self, reason: &str) {
        debug!("Caller reported connection issue: {}", reason);
        self.supervisor.retrigger();
    }

    async fn health_check(&self) -> Result<bool> {
        self.backend.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    const TTL: Duration = Duration::from_secs(60);

    fn client() -> (IndexedClient<InMemoryBackend>, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let client = IndexedClient::new(
            backend.clone(),
            ClientConfig::default().with_key_prefix("p"),
        )
        .expect("client");
        (client, backend)
    }

    fn sorted(mut keys: Vec<String>) -> Vec<String> {
        keys.sort();
        keys
    }

    /// Stored keys minus the heartbeat sentinel.
    fn stored(backend: &InMemoryBackend) -> Vec<String> {
        sorted(backend.keys().into_iter().filter(|k| k != "p:ping").collect())
    }

    #[tokio::test]
    async fn test_set_records_key_in_index() {
        let (client, _) = client();

        for key in ["a:b:c", "a:b", "d:e:r"] {
            client.set(key, b"1".to_vec(), TTL).await.expect("set");
        }

        let index = client.load_index().await.expect("index");
        assert_eq!(
            sorted(index.find_below::<&str>(&[])),
            vec!["a:b", "a:b:c", "d:e:r"]
        );
        assert_eq!(index.find_exact(&["a", "b"]), Some("a:b"));
    }

    #[tokio::test]
    async fn test_index_document_shape() {
        let (client, backend) = client();
        client.set("a:b", b"1".to_vec(), TTL).await.expect("set");

        let raw = backend
            .get("p:system:keys")
            .await
            .expect("get")
            .expect("index stored");
        let json: serde_json::Value = serde_json::from_slice(&raw).expect("json");
        assert_eq!(
            json,
            serde_json::json!({"entries": [{"path": ["a", "b"], "value": "a:b"}]})
        );
    }

    #[tokio::test]
    async fn test_deep_key_keeps_index_readable() {
        let (client, backend) = client();
        let deep: Vec<String> = (0..70).map(|i| format!("level{}", i)).collect();

        client.set("other:key", b"1".to_vec(), TTL).await.expect("set");
        client.set(&deep.join(":"), b"1".to_vec(), TTL).await.expect("set");
        client.set("third:key", b"1".to_vec(), TTL).await.expect("set");

        assert_eq!(client.load_index().await.expect("index").len(), 3);

        client.delete("other:*", true).await.expect("delete");
        assert_eq!(client.get("other:key").await.expect("get"), None);
        assert!(client.get("third:key").await.expect("get").is_some());
        assert_eq!(stored(&backend).len(), 3);
    }

    #[tokio::test]
    async fn test_wildcard_delete_uses_index() {
        let (client, backend) = client();
        for key in ["a:b", "a:b:c", "a:b:c:d", "a:x"] {
            client.set(key, b"1".to_vec(), TTL).await.expect("set");
        }

        client.delete("a:b:*", true).await.expect("delete");

        assert_eq!(stored(&backend), vec!["p:a:x", "p:system:keys"]);
        let index = client.load_index().await.expect("index");
        assert_eq!(index.find_below::<&str>(&[]), vec!["a:x".to_string()]);
    }

    #[tokio::test]
    async fn test_exact_delete_keeps_descendants_indexed() {
        let (client, _) = client();
        for key in ["a:b", "a:b:c"] {
            client.set(key, b"1".to_vec(), TTL).await.expect("set");
        }

        client.delete("a:b", false).await.expect("delete");

        assert_eq!(client.get("a:b").await.expect("get"), None);
        assert!(client.get("a:b:c").await.expect("get").is_some());
        let index = client.load_index().await.expect("index");
        assert_eq!(index.find_below::<&str>(&[]), vec!["a:b:c".to_string()]);
    }

    #[tokio::test]
    async fn test_star_alone_clears_everything() {
        let (client, backend) = client();
        for key in ["a:b", "c", "d:e:f"] {
            client.set(key, b"1".to_vec(), TTL).await.expect("set");
        }

        client.delete("*", true).await.expect("delete");

        assert_eq!(stored(&backend), vec!["p:system:keys"]);
        assert!(client.load_index().await.expect("index").is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_index_reads_as_empty() {
        let (client, backend) = client();
        backend
            .set("p:system:keys", b"not json".to_vec(), None)
            .await
            .expect("set");

        assert!(client.load_index().await.expect("index").is_empty());

        // The next write replaces the corrupt document.
        client.set("a", b"1".to_vec(), TTL).await.expect("set");
        let index = client.load_index().await.expect("index");
        assert_eq!(index.find_exact(&["a"]), Some("a"));
    }

    #[tokio::test]
    async fn test_concurrent_sets_keep_every_key() {
        let (client, _) = client();
        let client = std::sync::Arc::new(client);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move {
                    client
                        .set(&format!("k:{}", i), b"1".to_vec(), TTL)
                        .await
                        .expect("set");
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task");
        }

        assert_eq!(client.load_index().await.expect("index").len(), 20);
    }

    #[tokio::test]
    async fn test_reserved_key_rejected() {
        let (client, _) = client();
        let result = client.set("system:keys", b"1".to_vec(), TTL).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_supervised_by_default() {
        let (client, _) = client();
        assert!(client.connection_events().is_some());
        assert!(client.connection_status().is_some());
    }
}

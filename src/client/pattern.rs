//! Client for stores that match keys natively.

use super::CacheClient;
use crate::backend::CacheBackend;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::key::KeyPattern;
use crate::serialization::Codec;
use crate::supervisor::{ConnectionEvent, ConnectionSupervisor, SupervisorHandle, SupervisorStatus};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

/// Prefixing client over a backend with native wildcard delete.
///
/// A wildcard delete `a:b:*` becomes one `delete_matching("<prefix>:a:b:*")`
/// call plus a delete of the exact key `<prefix>:a:b`, so it covers the same
/// keys an index-backed delete would.
///
/// # Example
///
/// ```no_run
/// # use cachegate::backend::InMemoryBackend;
/// # use cachegate::client::{CacheClient, PatternClient};
/// # use cachegate::config::ClientConfig;
/// # use std::time::Duration;
/// # async fn example() -> cachegate::Result<()> {
/// let client = PatternClient::new(
///     InMemoryBackend::new(),
///     ClientConfig::default().with_key_prefix("portal"),
/// )?;
///
/// client.set("themes:1", b"\"dark\"".to_vec(), Duration::from_secs(60)).await?;
/// client.delete("themes:*", true).await?;
/// # Ok(())
/// # }
/// ```
pub struct PatternClient<B: CacheBackend> {
    backend: B,
    config: ClientConfig,
    supervisor: Option<SupervisorHandle>,
}

impl<B: CacheBackend> PatternClient<B> {
    /// Wrap a pattern-capable backend.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the configuration is invalid or the
    /// backend has no native pattern delete.
    pub fn new(backend: B, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        if !backend.supports_patterns() {
            return Err(Error::ConfigError(
                "PatternClient needs a backend with native pattern delete; use IndexedClient"
                    .to_string(),
            ));
        }

        Ok(PatternClient {
            backend,
            config,
            supervisor: None,
        })
    }

    /// Attach a connection supervisor so the client can take part in
    /// failover.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` outside a Tokio runtime.
    pub fn supervised(mut self) -> Result<Self> {
        let handle = ConnectionSupervisor::spawn(self.backend.clone(), &self.config)?;
        self.supervisor = Some(handle);
        Ok(self)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn supervisor(&self) -> Option<&SupervisorHandle> {
        self.supervisor.as_ref()
    }
}

#[async_trait]
impl<B: CacheBackend> CacheClient for PatternClient<B> {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.backend
            .set(&self.config.build_key(key), value, Some(ttl))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.get(&self.config.build_key(key)).await
    }

    async fn delete(&self, key: &str, is_pattern: bool) -> Result<()> {
        if !is_pattern {
            return self.backend.delete(&self.config.build_key(key)).await;
        }

        let pattern = KeyPattern::parse(key, &self.config.key_separator);
        if !pattern.is_wildcard() {
            return self.backend.delete(&self.config.build_key(key)).await;
        }

        let glob = pattern.to_glob(&self.config.key_prefix, &self.config.key_separator);
        let removed = self.backend.delete_matching(&glob).await?;

        if !pattern.path().is_empty() {
            let node_key = pattern.path().join(&self.config.key_separator);
            self.backend
                .delete(&self.config.build_key(&node_key))
                .await?;
        }

        debug!("Pattern delete {} removed {} keys", glob, removed);
        Ok(())
    }

    fn codec(&self) -> Codec {
        self.config.codec
    }

    fn connection_events(&self) -> Option<broadcast::Receiver<ConnectionEvent>> {
        self.supervisor.as_ref().map(SupervisorHandle::subscribe)
    }

    fn connection_status(&self) -> Option<SupervisorStatus> {
        self.supervisor.as_ref().map(SupervisorHandle::status)
    }

    fn report_issue(&self, reason: &str) {
        if let Some(supervisor) = &self.supervisor {
            debug!("Caller reported connection issue: {}", reason);
            supervisor.retrigger();
        }
    }

    async fn health_check(&self) -> Result<bool> {
        self.backend.health_check().await
    }
}

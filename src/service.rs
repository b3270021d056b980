//! The cache facade applications talk to.
//!
//! [`CacheService`] owns a registry of named client factories, the active
//! and failover clients, and the degradation state machine between them.

use crate::client::{SharedClient, VoidClient};
use crate::config::DEFAULT_TTL;
use crate::degradation::{attach_listener, CacheEvent, DegradationController, Mode};
use crate::error::{Error, Result};
use crate::memo::{KeySource, Memoized};
use crate::observability::{CacheMetrics, NoOpMetrics};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::DropGuard;

type ClientFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<SharedClient>> + Send + Sync>;

/// Backend-agnostic cache facade.
///
/// Cloning is cheap; all clones share one registry and one active client.
/// Until a client is activated the service runs on a [`VoidClient`], so
/// every lookup misses.
///
/// # Example
///
/// ```no_run
/// use cachegate::backend::InMemoryBackend;
/// use cachegate::client::{IndexedClient, SharedClient};
/// use cachegate::config::ClientConfig;
/// use cachegate::CacheService;
/// use std::sync::Arc;
///
/// async fn memory() -> cachegate::Result<SharedClient> {
///     let client = IndexedClient::new(InMemoryBackend::new(), ClientConfig::default())?;
///     Ok(Arc::new(client))
/// }
///
/// # async fn example() -> cachegate::Result<()> {
/// let cache = CacheService::new();
/// cache.register_client("memory", memory);
/// cache.set_active_client("memory").await?;
///
/// cache.set("user:1", &"alice", None).await?;
/// let name: Option<String> = cache.get("user:1").await?;
/// assert_eq!(name.as_deref(), Some("alice"));
///
/// cache.delete("user:*", true).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

struct Inner {
    registry: DashMap<String, ClientFactory>,
    controller: Arc<DegradationController>,
    listener: Mutex<Option<DropGuard>>,
    default_ttl: Duration,
    metrics: Arc<dyn CacheMetrics>,
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheService {
    /// Create a service with the default TTL and no metrics.
    pub fn new() -> Self {
        Self::build(DEFAULT_TTL, Arc::new(NoOpMetrics))
    }

    /// Create a service whose `set(.., None)` uses `ttl`.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self::build(ttl, Arc::new(NoOpMetrics))
    }

    /// Replace the metrics sink.
    ///
    /// Meant for setup: the registry and activated clients are not carried
    /// over.
    pub fn with_metrics(self, metrics: Arc<dyn CacheMetrics>) -> Self {
        Self::build(self.inner.default_ttl, metrics)
    }

    fn build(default_ttl: Duration, metrics: Arc<dyn CacheMetrics>) -> Self {
        let primary: SharedClient = Arc::new(VoidClient::new());
        CacheService {
            inner: Arc::new(Inner {
                registry: DashMap::new(),
                controller: Arc::new(DegradationController::new(primary, metrics.clone())),
                listener: Mutex::new(None),
                default_ttl,
                metrics,
            }),
        }
    }

    /// Register a named client factory. A second registration under the
    /// same name replaces the first.
    pub fn register_client<F, Fut>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SharedClient>> + Send + 'static,
    {
        let name = name.into();
        debug!("Registered cache client '{}'", name);
        self.inner
            .registry
            .insert(name, Arc::new(move || factory().boxed()));
    }

    /// Whether a factory is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.registry.contains_key(name)
    }

    /// Instantiate `name` and make it the primary client.
    ///
    /// Replaces any previous primary and leaves the service in primary mode.
    /// Operations already running on the old client finish there.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for an unregistered name, or whatever
    /// the factory returns.
    pub async fn set_active_client(&self, name: &str) -> Result<()> {
        let client = self.instantiate(name).await?;

        // Stop following the old primary before the new one is installed.
        let mut listener = self
            .inner
            .listener
            .lock()
            .map_err(|_| Error::Other("listener slot poisoned".to_string()))?;
        listener.take();

        self.inner.controller.set_primary(client.clone());
        *listener = attach_listener(&self.inner.controller, &client);

        info!(
            "✓ Active cache client '{}' ({}){}",
            name,
            client.name(),
            if listener.is_some() { ", supervised" } else { "" }
        );
        Ok(())
    }

    /// Instantiate `name` and keep it as the standby client.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for an unregistered name, or whatever
    /// the factory returns.
    pub async fn set_failover_client(&self, name: &str) -> Result<()> {
        let client = self.instantiate(name).await?;
        self.inner.controller.set_failover(client.clone());
        info!("✓ Failover cache client '{}' ({})", name, client.name());
        Ok(())
    }

    async fn instantiate(&self, name: &str) -> Result<SharedClient> {
        // Clone the factory out so no map guard is held across the await.
        let factory = self
            .inner
            .registry
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ConfigError(format!("cache client '{}' is not registered", name)))?;
        factory().await
    }

    /// Store `value` under `key`. `None` uses the service's default TTL.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if encoding fails, or the
    /// client's error if the write fails and no failover could take it.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ttl = ttl.unwrap_or(self.inner.default_ttl);
        let timer = Instant::now();

        let result = self
            .run(key, |client| {
                let encoded = client.codec().encode(value);
                async move { client.set(key, encoded?, ttl).await }
            })
            .await;

        match &result {
            Ok(()) => self.inner.metrics.record_set(key, timer.elapsed()),
            Err(e) => self.inner.metrics.record_error(key, &e.to_string()),
        }
        result
    }

    /// Fetch the value under `key`, `Ok(None)` when absent or expired.
    ///
    /// # Errors
    /// Returns `Error::DeserializationError` (or an envelope error) if the
    /// stored bytes do not decode as `T`, or the client's error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let timer = Instant::now();

        let result = self
            .run(key, |client| async move {
                match client.get(key).await? {
                    Some(bytes) => client.codec().decode(&bytes).map(Some),
                    None => Ok(None),
                }
            })
            .await;

        match &result {
            Ok(Some(_)) => self.inner.metrics.record_hit(key, timer.elapsed()),
            Ok(None) => self.inner.metrics.record_miss(key, timer.elapsed()),
            Err(e) => self.inner.metrics.record_error(key, &e.to_string()),
        }
        result
    }

    /// Remove `key`. With `is_pattern` a trailing `*` segment removes
    /// everything at and below the preceding path.
    ///
    /// # Errors
    /// Returns the client's error.
    pub async fn delete(&self, key: &str, is_pattern: bool) -> Result<()> {
        let timer = Instant::now();

        let result = self
            .run(key, |client| async move { client.delete(key, is_pattern).await })
            .await;

        match &result {
            Ok(()) => self.inner.metrics.record_delete(key, timer.elapsed()),
            Err(e) => self.inner.metrics.record_error(key, &e.to_string()),
        }
        result
    }

    /// Memoize `action` behind the cache.
    ///
    /// `key` is either a literal (`"reports:daily"`) or a
    /// [`KeySource::derived`] function of the call's arguments.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use cachegate::{CacheService, KeySource};
    /// # async fn example(cache: CacheService) -> cachegate::Result<()> {
    /// let lookup = cache.wrap_with_cache(
    ///     KeySource::derived(|id: &u64| format!("user:{}", id)),
    ///     |id: u64| async move { Ok::<_, cachegate::Error>(format!("user-{}", id)) },
    /// );
    ///
    /// let first = lookup.call(7).await?; // runs the action
    /// let again = lookup.call(7).await?; // served from cache
    /// assert_eq!(first, again);
    /// # Ok(())
    /// # }
    /// ```
    pub fn wrap_with_cache<A, T, E, F, Fut>(
        &self,
        key: impl Into<KeySource<A>>,
        action: F,
    ) -> Memoized<A, T, E, F>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: From<Error>,
    {
        Memoized::new(self.clone(), key.into(), action)
    }

    /// Whether requests are currently served by the failover client.
    pub fn is_degraded(&self) -> bool {
        self.inner.controller.mode() == Mode::Degraded
    }

    /// Kind name of the client serving requests right now.
    pub fn active_client_name(&self) -> String {
        self.inner.controller.active().name().to_string()
    }

    /// Receive failover and recovery notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.controller.subscribe()
    }

    /// Health of the client serving requests right now.
    ///
    /// # Errors
    /// Returns the client's error if the probe itself fails.
    pub async fn health_check(&self) -> Result<bool> {
        self.inner.controller.active().health_check().await
    }

    /// Run `op` on the active client.
    ///
    /// A connectivity error from a supervised primary fails over and
    /// retries once on the failover client, so the caller only sees the
    /// error when there is nowhere else to go.
    async fn run<R, F, Fut>(&self, key: &str, op: F) -> Result<R>
    where
        F: Fn(SharedClient) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let client = self.inner.controller.active();

        match op(client.clone()).await {
            Err(e) if e.is_connectivity() && client.connection_status().is_some() => {
                let reason = e.to_string();
                self.inner.controller.on_error(&client, &reason);
                client.report_issue(&reason);

                let now_active = self.inner.controller.active();
                if crate::client::same_client(&now_active, &client) {
                    return Err(e);
                }

                debug!(
                    "Retrying {} on '{}' after failover",
                    key,
                    now_active.name()
                );
                op(now_active).await
            }
            other => other,
        }
    }
}

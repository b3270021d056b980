//! Read-through memoization on top of [`CacheService`].

use crate::error::Error;
use crate::service::CacheService;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Where a memoized call gets its cache key from.
pub enum KeySource<A> {
    /// Same key for every call.
    Literal(String),
    /// Key computed from the call's arguments.
    Derived(Arc<dyn Fn(&A) -> String + Send + Sync>),
}

impl<A> KeySource<A> {
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        KeySource::Derived(Arc::new(f))
    }

    pub fn resolve(&self, args: &A) -> String {
        match self {
            KeySource::Literal(key) => key.clone(),
            KeySource::Derived(f) => f(args),
        }
    }
}

impl<A> Clone for KeySource<A> {
    fn clone(&self) -> Self {
        match self {
            KeySource::Literal(key) => KeySource::Literal(key.clone()),
            KeySource::Derived(f) => KeySource::Derived(f.clone()),
        }
    }
}

impl<A> fmt::Debug for KeySource<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Literal(key) => f.debug_tuple("Literal").field(key).finish(),
            KeySource::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

impl<A> From<&str> for KeySource<A> {
    fn from(key: &str) -> Self {
        KeySource::Literal(key.to_string())
    }
}

impl<A> From<String> for KeySource<A> {
    fn from(key: String) -> Self {
        KeySource::Literal(key)
    }
}

/// An async action whose successful results are cached.
///
/// Built by [`CacheService::wrap_with_cache`]. A hit skips the action. A
/// miss runs it and stores the value with the service's default TTL;
/// failures are returned and never cached. Concurrent misses on one key
/// each run the action and the last write wins.
pub struct Memoized<A, T, E, F> {
    cache: CacheService,
    key: KeySource<A>,
    action: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<A, T, E, F, Fut> Memoized<A, T, E, F>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Serialize + DeserializeOwned,
    E: From<Error>,
{
    pub(crate) fn new(cache: CacheService, key: KeySource<A>, action: F) -> Self {
        Memoized {
            cache,
            key,
            action,
            _marker: PhantomData,
        }
    }

    /// Key the next call with `args` would use.
    pub fn key_for(&self, args: &A) -> String {
        self.key.resolve(args)
    }

    /// Return the cached value for `args`, or run the action and cache it.
    ///
    /// # Errors
    /// Returns the action's error, or a cache read error converted into `E`.
    /// A failed write after a successful action is only logged.
    pub async fn call(&self, args: A) -> Result<T, E> {
        let key = self.key.resolve(&args);

        if let Some(hit) = self.cache.get::<T>(&key).await? {
            debug!("Memoized HIT {}", key);
            return Ok(hit);
        }

        debug!("Memoized MISS {}, running action", key);
        let value = (self.action)(args).await?;

        if let Err(e) = self.cache.set(&key, &value, None).await {
            warn!("Could not cache memoized result for {}: {}", key, e);
        }
        Ok(value)
    }
}

impl<A, T, E, F: Clone> Clone for Memoized<A, T, E, F> {
    fn clone(&self) -> Self {
        Memoized {
            cache: self.cache.clone(),
            key: self.key.clone(),
            action: self.action.clone(),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::client::{PatternClient, SharedClient};
    use crate::config::ClientConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn memory() -> crate::Result<SharedClient> {
        let client = PatternClient::new(InMemoryBackend::new(), ClientConfig::default())?;
        Ok(Arc::new(client))
    }

    async fn service() -> CacheService {
        let cache = CacheService::new();
        cache.register_client("memory", memory);
        cache.set_active_client("memory").await.expect("activate");
        cache
    }

    #[tokio::test]
    async fn test_miss_runs_action_then_hits() {
        let cache = service().await;
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let memo = cache.wrap_with_cache("answer", move |_: ()| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42u32)
            }
        });

        assert_eq!(memo.call(()).await.expect("first"), 42);
        assert_eq!(memo.call(()).await.expect("second"), 42);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get::<u32>("answer").await.expect("get"), Some(42));
    }

    #[tokio::test]
    async fn test_derived_key_per_argument() {
        let cache = service().await;
        let memo = cache.wrap_with_cache(
            KeySource::derived(|id: &u32| format!("user:{}", id)),
            |id: u32| async move { Ok::<_, Error>(format!("user-{}", id)) },
        );

        assert_eq!(memo.key_for(&7), "user:7");
        assert_eq!(memo.call(7).await.expect("call"), "user-7");
        assert_eq!(memo.call(8).await.expect("call"), "user-8");
        assert_eq!(
            cache.get::<String>("user:7").await.expect("get").as_deref(),
            Some("user-7")
        );
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = service().await;
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let memo = cache.wrap_with_cache("flaky", move |_: ()| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(Error::Other("first call fails".into()))
                } else {
                    Ok(attempt)
                }
            }
        });

        assert!(memo.call(()).await.is_err());
        assert_eq!(cache.get::<usize>("flaky").await.expect("get"), None);
        assert_eq!(memo.call(()).await.expect("second"), 1);
        assert_eq!(memo.call(()).await.expect("third"), 1);
    }

    #[test]
    fn test_key_source_debug() {
        let literal: KeySource<()> = "k".into();
        assert_eq!(format!("{:?}", literal), "Literal(\"k\")");
        let derived: KeySource<u8> = KeySource::derived(|n: &u8| n.to_string());
        assert_eq!(format!("{:?}", derived), "Derived(..)");
    }
}

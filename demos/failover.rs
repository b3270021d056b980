//! Failover walkthrough: memoized lookups, pattern invalidation, and a
//! primary store that goes away and comes back.
//!
//! Run with: `RUST_LOG=info cargo run --example failover`

use cachegate::backend::{CacheBackend, InMemoryBackend};
use cachegate::client::{IndexedClient, SharedClient, VoidClient};
use cachegate::config::ClientConfig;
use cachegate::{CacheEvent, CacheService, Error, KeySource, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Example value: a tenant's theme
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Theme {
    tenant: String,
    accent: String,
}

/// In-memory store with a cable you can pull.
#[derive(Clone)]
struct UnpluggableStore {
    inner: InMemoryBackend,
    unplugged: Arc<AtomicBool>,
}

impl UnpluggableStore {
    fn check(&self) -> Result<()> {
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(Error::BackendError("store unplugged".to_string()));
        }
        Ok(())
    }
}

impl CacheBackend for UnpluggableStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.check()?;
        Ok(true)
    }
}

/// Simulated slow theme lookup
async fn load_theme(tenant: String) -> Result<Theme> {
    println!("  [DB] Loading theme for {}", tenant);
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(Theme {
        accent: format!("#{:06x}", tenant.len() * 0x1f1f1f),
        tenant,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let store = UnpluggableStore {
        inner: InMemoryBackend::new(),
        unplugged: Arc::new(AtomicBool::new(false)),
    };

    let cache = CacheService::new();

    let primary_store = store.clone();
    cache.register_client("primary", move || {
        let store = primary_store.clone();
        async move {
            let config = ClientConfig::default()
                .with_key_prefix("demo")
                .with_ping_interval(Duration::from_secs(1))
                .with_reconnect(10, Duration::from_secs(1));
            Ok::<SharedClient, Error>(Arc::new(IndexedClient::new(store, config)?))
        }
    });
    cache.register_client("disabled", || async {
        Ok(Arc::new(VoidClient::new()) as SharedClient)
    });

    cache.set_active_client("primary").await?;
    cache.set_failover_client("disabled").await?;

    let mut events = cache.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                CacheEvent::ClientError(reason) => println!("  [EVENT] failover: {}", reason),
                CacheEvent::ClientReconnect => println!("  [EVENT] primary restored"),
            }
        }
    });

    let themes = cache.wrap_with_cache(
        KeySource::derived(|tenant: &String| format!("themes:{}", tenant)),
        load_theme,
    );

    println!("=== Memoized lookups ===\n");
    for tenant in ["acme", "acme", "globex"] {
        let theme = themes.call(tenant.to_string()).await?;
        println!("  {} -> {:?}", tenant, theme);
    }

    println!("\n=== Pattern invalidation ===\n");
    cache.delete("themes:*", true).await?;
    themes.call("acme".to_string()).await?;

    println!("\n=== Primary goes away ===\n");
    store.unplugged.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!(
        "  degraded: {}, serving from '{}'",
        cache.is_degraded(),
        cache.active_client_name()
    );
    themes.call("acme".to_string()).await?;

    println!("\n=== Primary comes back ===\n");
    store.unplugged.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!(
        "  degraded: {}, serving from '{}'",
        cache.is_degraded(),
        cache.active_client_name()
    );
    themes.call("acme".to_string()).await?;

    Ok(())
}

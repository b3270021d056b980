//! Memcached Backend Integration Tests
//!
//! These tests require a running Memcached instance and skip themselves
//! when none is reachable.
//!
//! ```bash
//! docker run -p 11211:11211 memcached:1.6
//! cargo test --features memcached --test memcached_integration_test
//! ```
//!
//! **Note:** Every test uses its own key prefix so tests can run in parallel.
//!
//! ## Environment Variables
//!
//! - `TEST_MEMCACHED_URL`: Memcached server address (default: "localhost:11211")
//!
//! ## What's Tested
//!
//! 1. Connection and health check
//! 2. Facade round trip through an indexed client
//! 3. Wildcard delete resolved through the persisted key index
//! 4. TTL expiration

#![cfg(feature = "memcached")]

use cachegate::backend::{CacheBackend, MemcachedBackend, MemcachedConfig};
use cachegate::client::{CacheClient, IndexedClient, SharedClient};
use cachegate::config::ClientConfig;
use cachegate::CacheService;
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Helper: Get Memcached server address from environment or use default
fn get_memcached_url() -> String {
    env::var("TEST_MEMCACHED_URL").unwrap_or_else(|_| "localhost:11211".to_string())
}

/// Helper: Unique key prefix per test, from a UUID v7.
fn unique_prefix() -> String {
    format!("test_{}", uuid::Uuid::now_v7().simple())
}

/// Helper: Create a test Memcached backend
async fn create_test_backend() -> Result<MemcachedBackend, Box<dyn std::error::Error>> {
    let config = MemcachedConfig {
        servers: vec![get_memcached_url()],
        connection_timeout: Duration::from_secs(5),
        pool_size: 8,
    };
    Ok(MemcachedBackend::new(config).await?)
}

/// Helper: Check if Memcached is available
async fn is_memcached_available() -> bool {
    match create_test_backend().await {
        Ok(backend) => backend.health_check().await.unwrap_or(false),
        Err(_) => false,
    }
}

async fn indexed_client(prefix: &str) -> IndexedClient<MemcachedBackend> {
    let backend = create_test_backend()
        .await
        .expect("Failed to create Memcached backend");
    IndexedClient::new(backend, ClientConfig::default().with_key_prefix(prefix))
        .expect("Failed to create client")
}

#[tokio::test]
async fn test_memcached_connection() {
    if !is_memcached_available().await {
        println!("⚠️  Memcached not available, skipping test");
        return;
    }

    let backend = create_test_backend().await.expect("backend");
    assert!(backend.health_check().await.expect("Health check failed"));
    assert!(!backend.supports_patterns());
}

#[tokio::test]
async fn test_memcached_facade_round_trip() {
    if !is_memcached_available().await {
        println!("⚠️  Memcached not available, skipping test");
        return;
    }

    let prefix = unique_prefix();
    let cache = CacheService::new();
    cache.register_client("memcached", move || {
        let prefix = prefix.clone();
        async move { Ok(Arc::new(indexed_client(&prefix).await) as SharedClient) }
    });
    cache
        .set_active_client("memcached")
        .await
        .expect("Failed to activate");

    cache
        .set("profile:42", &vec!["admin", "editor"], None)
        .await
        .expect("Failed to set");
    let roles: Option<Vec<String>> = cache.get("profile:42").await.expect("Failed to get");
    assert_eq!(roles, Some(vec!["admin".to_string(), "editor".to_string()]));

    cache.delete("profile:42", false).await.expect("Failed to delete");
    assert_eq!(
        cache.get::<Vec<String>>("profile:42").await.expect("get"),
        None
    );
}

#[tokio::test]
async fn test_memcached_wildcard_delete_via_index() {
    if !is_memcached_available().await {
        println!("⚠️  Memcached not available, skipping test");
        return;
    }

    let prefix = unique_prefix();
    let client = indexed_client(&prefix).await;
    let ttl = Duration::from_secs(60);

    for key in ["themes:t1", "themes:t1:dark", "themes:t2"] {
        client.set(key, b"1".to_vec(), ttl).await.expect("Failed to set");
    }

    let index = client.load_index().await.expect("Failed to load index");
    assert_eq!(index.len(), 3);

    client
        .delete("themes:t1:*", true)
        .await
        .expect("Failed to delete");

    assert_eq!(client.get("themes:t1").await.expect("get"), None);
    assert_eq!(client.get("themes:t1:dark").await.expect("get"), None);
    assert!(client.get("themes:t2").await.expect("get").is_some());

    let index = client.load_index().await.expect("Failed to load index");
    assert_eq!(index.find_below::<&str>(&[]), vec!["themes:t2".to_string()]);

    client.delete("*", true).await.expect("cleanup");
}

#[tokio::test]
async fn test_memcached_ttl_expiration() {
    if !is_memcached_available().await {
        println!("⚠️  Memcached not available, skipping test");
        return;
    }

    let prefix = unique_prefix();
    let client = indexed_client(&prefix).await;

    client
        .set("short", b"1".to_vec(), Duration::from_secs(1))
        .await
        .expect("Failed to set");
    assert!(client.get("short").await.expect("get").is_some());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(client.get("short").await.expect("get"), None);
}

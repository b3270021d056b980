//! Metrics hooks for cache operations and failover transitions.
//!
//! Implement [`CacheMetrics`] to feed your monitoring system:
//!
//! ```ignore
//! use cachegate::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//!     fn record_failover(&self, _reason: &str) {
//!         // counter!("cache_failovers").inc();
//!     }
//!     // ... other methods keep their logging defaults
//! }
//!
//! // let cache = CacheService::new().with_metrics(Arc::new(PrometheusMetrics));
//! ```
//!
//! The default methods log through the `log` crate. [`NoOpMetrics`], the
//! service default, discards everything.

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a cache hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a cache miss.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a cache set operation.
    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// Record a cache delete operation.
    fn record_delete(&self, key: &str, duration: Duration) {
        debug!("Cache DELETE: {} took {:?}", key, duration);
    }

    /// Record an error.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }

    /// The facade switched to the failover client.
    fn record_failover(&self, reason: &str) {
        warn!("Cache FAILOVER: {}", reason);
    }

    /// The primary client came back and was restored.
    fn record_recovery(&self) {
        info!("Cache RECOVERED");
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_delete(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
    fn record_failover(&self, _reason: &str) {}
    fn record_recovery(&self) {}
}

/// Metrics that only log, using the trait's default methods.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}

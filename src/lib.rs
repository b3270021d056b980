//! # cachegate
//!
//! A backend-agnostic cache facade with pluggable storage clients, pattern
//! invalidation and automatic failover.
//!
//! ## Features
//!
//! - **Backend Agnostic:** In-memory, Redis and Memcached backends behind one [`CacheBackend`] trait
//! - **Pattern Invalidation:** `delete("themes:tenant-1:*", true)` on any store, natively
//!   ([`PatternClient`](client::PatternClient)) or through a persisted key index
//!   ([`IndexedClient`](client::IndexedClient))
//! - **Failover:** a supervised primary falls back to a standby client and is restored when it reconnects
//! - **Memoization:** [`CacheService::wrap_with_cache`] turns any async action into a read-through cache
//!
//! ## Layers
//!
//! ```text
//! CacheService ── DegradationController ── active / failover client
//!                                               │
//!                       VoidClient | PatternClient<B> | IndexedClient<B>
//!                                               │
//!                       ConnectionSupervisor ── CacheBackend (InMemory, Redis, Memcached)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use cachegate::backend::InMemoryBackend;
//! use cachegate::client::{IndexedClient, SharedClient, VoidClient};
//! use cachegate::config::ClientConfig;
//! use cachegate::CacheService;
//! use std::sync::Arc;
//!
//! async fn primary() -> cachegate::Result<SharedClient> {
//!     let config = ClientConfig::default().with_key_prefix("portal");
//!     Ok(Arc::new(IndexedClient::new(InMemoryBackend::new(), config)?))
//! }
//!
//! async fn disabled() -> cachegate::Result<SharedClient> {
//!     Ok(Arc::new(VoidClient::new()))
//! }
//!
//! # async fn example() -> cachegate::Result<()> {
//! let cache = CacheService::new();
//! cache.register_client("primary", primary);
//! cache.register_client("disabled", disabled);
//! cache.set_active_client("primary").await?;
//! cache.set_failover_client("disabled").await?;
//!
//! cache.set("themes:tenant-1:dark", &vec!["#000", "#fff"], None).await?;
//! cache.delete("themes:tenant-1:*", true).await?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod client;
pub mod config;
pub mod degradation;
pub mod error;
pub mod index;
pub mod key;
pub mod memo;
pub mod observability;
pub mod serialization;
pub mod service;
pub mod supervisor;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use client::{CacheClient, SharedClient};
pub use config::ClientConfig;
pub use degradation::CacheEvent;
pub use error::{Error, Result};
pub use memo::{KeySource, Memoized};
pub use service::CacheService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

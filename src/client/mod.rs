//! Storage clients: the uniform surface the cache facade talks to.
//!
//! | Client | Backend requirement | Pattern delete |
//! |--------|---------------------|----------------|
//! | [`VoidClient`] | none | no-op |
//! | [`PatternClient`] | `supports_patterns()` | native glob |
//! | [`IndexedClient`] | any | via the persisted [`KeyIndex`](crate::index::KeyIndex) |
//!
//! Clients take and return encoded bytes. Encoding happens in the facade
//! with the codec the client reports through [`CacheClient::codec`].

use crate::error::Result;
use crate::serialization::Codec;
use crate::supervisor::{ConnectionEvent, SupervisorStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub mod indexed;
pub mod pattern;
pub mod void;

pub use indexed::IndexedClient;
pub use pattern::PatternClient;
pub use void::VoidClient;

/// A client shared between the facade, its registry and listener tasks.
pub type SharedClient = Arc<dyn CacheClient>;

/// Uniform cache operations over some storage.
///
/// Keys are user keys; prefixing is the client's job. `delete` with
/// `is_pattern` set treats a trailing `*` segment as "everything below".
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Short name of the client kind, used in logs.
    fn name(&self) -> &str;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, key: &str, is_pattern: bool) -> Result<()>;

    /// Codec values for this client are encoded with.
    fn codec(&self) -> Codec {
        Codec::Json
    }

    /// Connection events, if the client is supervised.
    ///
    /// Only supervised clients take part in failover.
    fn connection_events(&self) -> Option<broadcast::Receiver<ConnectionEvent>> {
        None
    }

    /// Current supervision status, if the client is supervised.
    fn connection_status(&self) -> Option<SupervisorStatus> {
        None
    }

    /// Tell the client a caller saw its connection fail.
    ///
    /// Supervised clients restart their connect cycle so recovery is
    /// eventually reported as `Connected`.
    fn report_issue(&self, _reason: &str) {}

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Whether two shared handles point at the same client.
pub(crate) fn same_client(a: &SharedClient, b: &SharedClient) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_client_compares_allocation() {
        let a: SharedClient = Arc::new(VoidClient::new());
        let b: SharedClient = Arc::new(VoidClient::new());
        let a2 = a.clone();

        assert!(same_client(&a, &a2));
        assert!(!same_client(&a, &b));
    }
}

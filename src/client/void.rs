//! The do-nothing client: caching disabled.

use super::CacheClient;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Client that stores nothing.
///
/// Every `get` misses and every write succeeds without effect. It is the
/// facade's initial active client, so an unconfigured cache behaves like
/// no cache at all.
#[derive(Clone, Debug, Default)]
pub struct VoidClient;

impl VoidClient {
    pub fn new() -> Self {
        VoidClient
    }
}

#[async_trait]
impl CacheClient for VoidClient {
    fn name(&self) -> &str {
        "void"
    }

    async fn set(&self, key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
        trace!("Void SET {} ignored", key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        trace!("Void GET {} -> MISS", key);
        Ok(None)
    }

    async fn delete(&self, _key: &str, _is_pattern: bool) -> Result<()> {
        Ok(())
    }
}

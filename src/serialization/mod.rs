//! Value codecs used by clients to turn caller values into stored bytes.
//!
//! Two formats are available:
//!
//! - [`Codec::Json`] (default): plain `serde_json`. Stored values stay readable
//!   by other processes sharing the store.
//! - [`Codec::Postcard`]: compact binary wrapped in a versioned envelope.
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (u32)    │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "CGTE"              schema version     postcard::to_allocvec(T)
//! ```
//!
//! Malformed bytes never come back raw: decoding surfaces
//! `Error::DeserializationError`, `Error::InvalidCacheEntry` or
//! `Error::VersionMismatch`.
//!
//! # Example
//!
//! ```rust
//! use cachegate::serialization::Codec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Theme {
//!     id: u64,
//!     name: String,
//! }
//!
//! # fn main() -> cachegate::Result<()> {
//! let theme = Theme { id: 1, name: "dark".to_string() };
//!
//! for codec in [Codec::Json, Codec::Postcard] {
//!     let bytes = codec.encode(&theme)?;
//!     let decoded: Theme = codec.decode(&bytes)?;
//!     assert_eq!(theme, decoded);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Magic header for enveloped entries: b"CGTE"
pub const CACHE_MAGIC: [u8; 4] = *b"CGTE";

/// Current envelope schema version.
///
/// Increment when the layout of cached types changes incompatibly; entries
/// written under another version are rejected with `Error::VersionMismatch`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for postcard entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    pub magic: [u8; 4],
    pub version: u32,
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encoding used for values stored through a client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Codec {
    /// JSON text (default)
    #[default]
    Json,

    /// Postcard binary inside a [`CacheEnvelope`]
    Postcard,
}

impl Codec {
    /// Encode a value for storage.
    ///
    /// # Errors
    ///
    /// Returns `Error::SerializationError` if the value cannot be encoded.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => serde_json::to_vec(value).map_err(|e| {
                error!("Cache serialization failed: {}", e);
                Error::SerializationError(e.to_string())
            }),
            Codec::Postcard => {
                postcard::to_allocvec(&CacheEnvelope::new(value)).map_err(|e| {
                    error!("Cache serialization failed: {}", e);
                    Error::SerializationError(e.to_string())
                })
            }
        }
    }

    /// Decode stored bytes.
    ///
    /// # Errors
    ///
    /// - `Error::DeserializationError`: bytes are malformed for this codec or type
    /// - `Error::InvalidCacheEntry`: envelope magic mismatch (postcard only)
    /// - `Error::VersionMismatch`: envelope schema version mismatch (postcard only)
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => serde_json::from_slice(bytes).map_err(|e| {
                warn!("Cache deserialization failed: {}", e);
                Error::DeserializationError(e.to_string())
            }),
            Codec::Postcard => decode_envelope(bytes),
        }
    }
}

fn decode_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        warn!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

//! Error types for the cache facade and its clients.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cachegate.
///
/// Absence is never an error: a miss is `Ok(None)` from `get` and deleting a
/// key that does not exist is `Ok(())`.
#[derive(Debug, Clone)]
pub enum Error {
    /// Encoding a value for storage failed.
    ///
    /// Common causes:
    /// - Value contains non-serializable types (maps with non-string keys for JSON)
    /// - Postcard codec error
    SerializationError(String),

    /// Decoding stored bytes failed.
    ///
    /// The stored value is malformed for the configured codec or for the
    /// requested type. The entry can be deleted and recomputed.
    DeserializationError(String),

    /// Backend storage error (Redis, Memcached, etc).
    ///
    /// This is the connectivity failure kind. When a failover client is
    /// registered, the degradation controller swaps it in; otherwise the error
    /// reaches the caller.
    BackendError(String),

    /// Configuration error during setup.
    ///
    /// Common causes:
    /// - Unregistered client name passed to `set_active_client`
    /// - Empty key separator, zero intervals
    /// - Invalid connection string
    ///
    /// **Recovery:** Fix configuration and restart.
    ConfigError(String),

    /// Operation not supported by this backend.
    ///
    /// Returned by `CacheBackend::delete_matching` on stores without native
    /// wildcard deletion.
    NotImplemented(String),

    /// Stored bytes are not a cachegate envelope (bad magic).
    InvalidCacheEntry(String),

    /// Envelope schema version differs from the compiled one.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from stored entry)
        found: u32,
    },

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether this error indicates the backend itself is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::BackendError(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() || e.is_eof() || e.is_data() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        match e {
            postcard::Error::SerializeBufferFull
            | postcard::Error::SerializeSeqLengthUnknown
            | postcard::Error::SerdeSerCustom => Error::SerializationError(e.to_string()),
            _ => Error::DeserializationError(e.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConfigError("no client named 'memcached'".to_string());
        assert_eq!(err.to_string(), "Config error: no client named 'memcached'");
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_json_syntax_error_is_deserialization() {
        let err: Error = serde_json::from_str::<u32>("{not json")
            .expect_err("should fail")
            .into();
        assert!(matches!(err, Error::DeserializationError(_)));
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(Error::BackendError("down".into()).is_connectivity());
        assert!(!Error::ConfigError("bad".into()).is_connectivity());
    }
}

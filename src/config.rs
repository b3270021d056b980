//! Client configuration: key layout, TTLs and connection supervision timing.

use crate::error::{Error, Result};
use crate::serialization::Codec;
use std::time::Duration;

/// Default TTL applied when a caller does not pass one (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default key prefix namespacing every entry written by a client.
pub const DEFAULT_KEY_PREFIX: &str = "default:prefix";

/// Default separator between key segments.
pub const DEFAULT_KEY_SEPARATOR: &str = ":";

/// Name of the reserved key holding the serialized key index.
pub const KEY_STORAGE_NAME: &str = "system:keys";

/// Segment that turns a delete path into a wildcard.
pub const WILDCARD: &str = "*";

const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);
const DEFAULT_PING_TTL: Duration = Duration::from_secs(10);
const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(30 * 60);

/// Configuration shared by the prefixing clients.
///
/// Read once at setup; nothing re-validates it at runtime.
///
/// # Example
///
/// ```
/// use cachegate::config::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_key_prefix("portal")
///     .with_reconnect(3, Duration::from_secs(5));
///
/// assert_eq!(config.build_key("user:42"), "portal:user:42");
/// assert_eq!(config.key_storage_name(), "portal:system:keys");
/// ```
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub key_prefix: String,
    pub key_separator: String,
    pub default_ttl: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
    pub ping_ttl: Duration,
    pub index_ttl: Duration,
    pub codec: Codec,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            key_separator: DEFAULT_KEY_SEPARATOR.to_string(),
            default_ttl: DEFAULT_TTL,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_ttl: DEFAULT_PING_TTL,
            index_ttl: DEFAULT_INDEX_TTL,
            codec: Codec::default(),
        }
    }
}

impl ClientConfig {
    /// Build configuration from `CACHEGATE_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults:
    /// - `CACHEGATE_KEY_PREFIX`
    /// - `CACHEGATE_KEY_SEPARATOR`
    /// - `CACHEGATE_DEFAULT_TTL_SECS`
    /// - `CACHEGATE_RECONNECT_ATTEMPTS`
    /// - `CACHEGATE_RECONNECT_DELAY_SECS`
    /// - `CACHEGATE_PING_INTERVAL_SECS`
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let defaults = ClientConfig::default();

        let config = ClientConfig {
            key_prefix: std::env::var("CACHEGATE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            key_separator: std::env::var("CACHEGATE_KEY_SEPARATOR")
                .unwrap_or(defaults.key_separator),
            default_ttl: env_secs("CACHEGATE_DEFAULT_TTL_SECS").unwrap_or(defaults.default_ttl),
            reconnect_attempts: std::env::var("CACHEGATE_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(defaults.reconnect_attempts),
            reconnect_delay: env_secs("CACHEGATE_RECONNECT_DELAY_SECS")
                .unwrap_or(defaults.reconnect_delay),
            ping_interval: env_secs("CACHEGATE_PING_INTERVAL_SECS")
                .unwrap_or(defaults.ping_interval),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_key_separator(mut self, separator: impl Into<String>) -> Self {
        self.key_separator = separator.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the bounded reconnect policy: `attempts` tries, each after `delay`.
    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_index_ttl(mut self, ttl: Duration) -> Self {
        self.index_ttl = ttl;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Check the configuration for values the clients cannot work with.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.key_separator.is_empty() {
            return Err(Error::ConfigError("key separator must not be empty".into()));
        }
        if self.key_separator == WILDCARD {
            return Err(Error::ConfigError(format!(
                "key separator cannot be the wildcard '{}'",
                WILDCARD
            )));
        }
        if self.reconnect_attempts == 0 {
            return Err(Error::ConfigError(
                "reconnect attempts must be at least 1".into(),
            ));
        }
        if self.ping_interval.is_zero() || self.reconnect_delay.is_zero() {
            return Err(Error::ConfigError(
                "ping interval and reconnect delay must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Fully-qualified backend key for a user key.
    pub fn build_key(&self, key: &str) -> String {
        format!("{}{}{}", self.key_prefix, self.key_separator, key)
    }

    /// Backend key of the serialized key index.
    pub fn key_storage_name(&self) -> String {
        self.build_key(KEY_STORAGE_NAME)
    }

    /// Backend key of the heartbeat sentinel.
    pub fn ping_key(&self) -> String {
        self.build_key("ping")
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

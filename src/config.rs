//! Process configuration.
//!
//! Settings are fixed for the lifetime of the process. Every subscription key
//! shares the same source URLs, refresh interval and server-version tag; the
//! key selects which part of each source document it reads and which path
//! namespace it is served under.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_URL: &str = "channels.yaml";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 86_400);
const MIN_FETCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Path segments owned by the server itself.
const RESERVED_KEYS: &[&str] = &["health"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one subscription key is required")]
    NoKeys,

    #[error("at least one source URL is required")]
    NoUrls,

    #[error("invalid subscription key {0:?}: use letters, digits, '-', '_' or '.'")]
    InvalidKey(String),

    #[error("subscription key {0:?} is reserved")]
    ReservedKey(String),

    #[error("subscription key {0:?} is configured more than once")]
    DuplicateKey(String),

    #[error("refresh interval must be at least 1s, got {0:?}")]
    IntervalTooShort(Duration),

    #[error("refresh interval must be at most 30d, got {0:?}")]
    IntervalTooLong(Duration),

    #[error("fetch timeout must be at least 100ms, got {0:?}")]
    FetchTimeoutTooShort(Duration),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
    pub keys: Vec<String>,
    pub urls: Vec<String>,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub server_version: String,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keys.is_empty() {
            return Err(ConfigError::NoKeys);
        }
        if self.urls.is_empty() {
            return Err(ConfigError::NoUrls);
        }

        let mut seen = HashSet::new();
        for key in &self.keys {
            if !is_path_safe(key) {
                return Err(ConfigError::InvalidKey(key.clone()));
            }
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(ConfigError::ReservedKey(key.clone()));
            }
            if !seen.insert(key.as_str()) {
                return Err(ConfigError::DuplicateKey(key.clone()));
            }
        }

        if self.refresh_interval < MIN_REFRESH_INTERVAL {
            return Err(ConfigError::IntervalTooShort(self.refresh_interval));
        }
        if self.refresh_interval > MAX_REFRESH_INTERVAL {
            return Err(ConfigError::IntervalTooLong(self.refresh_interval));
        }
        if self.fetch_timeout < MIN_FETCH_TIMEOUT {
            return Err(ConfigError::FetchTimeoutTooShort(self.fetch_timeout));
        }

        Ok(())
    }

    /// Fetch timeout actually applied: a fetch may never outlive half a
    /// refresh interval.
    pub fn effective_fetch_timeout(&self) -> Duration {
        let ceiling = self.refresh_interval / 2;
        if self.fetch_timeout > ceiling {
            tracing::warn!(
                fetch_timeout = ?self.fetch_timeout,
                refresh_interval = ?self.refresh_interval,
                "fetch timeout clamped to half the refresh interval"
            );
            ceiling
        } else {
            self.fetch_timeout
        }
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionConfig> {
        let fetch_timeout = self.effective_fetch_timeout();
        self.keys
            .iter()
            .map(|key| SubscriptionConfig {
                key: key.clone(),
                urls: self.urls.clone(),
                refresh_interval: self.refresh_interval,
                fetch_timeout,
                server_version: self.server_version.clone(),
            })
            .collect()
    }
}

/// Settings for one subscription key.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub key: String,
    /// Source URLs in merge order: later entries override earlier ones.
    pub urls: Vec<String>,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub server_version: String,
}

impl SubscriptionConfig {
    /// Create a config with default timings and no server-version tag.
    pub fn new(key: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            key: key.into(),
            urls,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            server_version: String::new(),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }
}

fn is_path_safe(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && key != "."
        && key != ".."
}

/// Parse a duration such as `15m`, `30s`, `1h30m` or `250ms`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration cannot be empty".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("invalid duration {input:?}: expected a number"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}: number too large"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            "d" => Duration::from_secs(value.saturating_mul(86_400)),
            "" => return Err(format!("invalid duration {input:?}: missing unit")),
            other => return Err(format!("invalid duration {input:?}: unknown unit {other:?}")),
        };
        total = total.saturating_add(part);
    }

    Ok(total)
}

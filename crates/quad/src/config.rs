//! Configuration surface consumed by the core.

use std::time::Duration;

use serde::Deserialize;

use quad_cache::RetryPolicy;
use quad_events::SnapshotConfig;
use quad_people::DirectoryConfig;

/// Retry knobs, mirrored into a [`RetryPolicy`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Upstream endpoints and credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub events_url: String,
    pub directory_url: String,
    pub directory_api_key: String,
    pub scholars_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            events_url: "https://calendar.duke.edu/events/index.json".into(),
            directory_url: "https://streamer.oit.duke.edu/ldap/people".into(),
            directory_api_key: String::new(),
            scholars_url: "https://scholars.duke.edu/widgets/api/v0.9".into(),
        }
    }
}

/// Recognized options of the core, all with sensible defaults so a partial
/// deserialized config (or `Config::default()`) is directly usable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds a fetched event feed stays fresh. Default 3600.
    pub cache_ttl_secs: Option<u64>,
    /// Seconds between scheduled refreshes. Defaults to `cache_ttl_secs`.
    pub refresh_interval_secs: Option<u64>,
    /// Seconds past expiry/retirement stale data may still serve. Default 300.
    pub stale_grace_secs: Option<u64>,
    /// Epochs retained: the current one plus retired ones. Default 2.
    pub epoch_retention_count: Option<usize>,
    /// Deadline for one upstream fetch, retries included. Default 30.
    pub fetch_timeout_secs: Option<u64>,
    /// Seconds directory lookups stay fresh; long, directory data changes
    /// rarely. Default 86400.
    pub directory_ttl_secs: Option<u64>,
    /// Seconds scholar profiles stay fresh. Default 3600.
    pub profile_ttl_secs: Option<u64>,
    pub retry: RetryConfig,
    pub upstreams: UpstreamConfig,
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(3600))
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.cache_ttl())
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs.unwrap_or(300))
    }

    pub fn epoch_retention(&self) -> usize {
        self.epoch_retention_count.unwrap_or(2)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.unwrap_or(30))
    }

    pub fn directory_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_ttl_secs.unwrap_or(86_400))
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs.unwrap_or(3600))
    }

    pub fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            cache_ttl: self.cache_ttl(),
            stale_grace: self.stale_grace(),
            epoch_retention: self.epoch_retention(),
            fetch_timeout: self.fetch_timeout(),
        }
    }

    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            search_ttl: self.directory_ttl(),
            person_ttl: self.directory_ttl(),
            stale_grace: self.stale_grace(),
            fetch_timeout: self.fetch_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.refresh_interval(), Duration::from_secs(3600));
        assert_eq!(config.stale_grace(), Duration::from_secs(300));
        assert_eq!(config.epoch_retention(), 2);
        assert_eq!(config.directory_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"cache_ttl_secs": 60, "retry": {"max_attempts": 2}}"#)
                .unwrap();
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        // refresh interval follows the shortened TTL
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.epoch_retention(), 2);
    }
}

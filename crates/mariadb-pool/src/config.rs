//! Pool configuration.

use std::time::Duration;

use mariadb_client::config::connection_string_pairs;

use crate::error::PoolError;

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum number of live sessions (idle + active).
    pub connection_limit: u32,

    /// Number of sessions opened when the pool starts.
    ///
    /// Sessions beyond this are created lazily, on demand.
    pub min_connections: u32,

    /// How long an acquisition may wait, measured from when it was queued.
    ///
    /// `None` waits forever.
    pub acquire_timeout: Option<Duration>,

    /// Idle time after which a session is probed before being handed out.
    ///
    /// Zero probes on every checkout.
    pub min_delay_validation: Duration,

    /// Whether a session released with an open transaction is rolled back.
    pub reset_on_release: bool,

    /// Delay before retrying a failed connection attempt while callers wait.
    pub create_retry_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connection_limit: 10,
            min_connections: 0,
            acquire_timeout: Some(Duration::from_secs(10)),
            min_delay_validation: Duration::from_millis(500),
            reset_on_release: true,
            create_retry_backoff: Duration::from_millis(500),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the pool options out of a connection string.
    ///
    /// ```text
    /// Server=db;User=app;Connection Limit=20;Acquire Timeout=2000;Min Delay Validation=0
    /// ```
    ///
    /// Durations are in milliseconds. Keys that belong to the session
    /// configuration are skipped, so one string can configure both.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, PoolError> {
        let mut config = Self::default();

        let pairs = connection_string_pairs(conn_str)
            .map_err(|err| PoolError::Configuration(err.description().to_string()))?;
        for (key, value) in pairs {
            match key.as_str() {
                "connection limit" | "connectionlimit" | "max pool size" => {
                    config.connection_limit = parse_number(&key, value)?;
                }
                "min connections" | "minconnections" | "min pool size" => {
                    config.min_connections = parse_number(&key, value)?;
                }
                "acquire timeout" | "acquiretimeout" => {
                    config = config.acquire_timeout(Duration::from_millis(parse_number(&key, value)?));
                }
                "min delay validation" | "mindelayvalidation" => {
                    config.min_delay_validation = Duration::from_millis(parse_number(&key, value)?);
                }
                "reset on release" => {
                    config.reset_on_release = parse_bool(&key, value)?;
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the maximum number of live sessions.
    #[must_use]
    pub fn connection_limit(mut self, limit: u32) -> Self {
        self.connection_limit = limit;
        self
    }

    /// Set the number of sessions opened at startup.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the acquisition timeout. A zero duration disables it.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Wait forever for a session.
    #[must_use]
    pub fn no_acquire_timeout(mut self) -> Self {
        self.acquire_timeout = None;
        self
    }

    /// Set the idle time after which checkout probes the session.
    #[must_use]
    pub fn min_delay_validation(mut self, delay: Duration) -> Self {
        self.min_delay_validation = delay;
        self
    }

    /// Enable or disable the implicit rollback on release.
    #[must_use]
    pub fn reset_on_release(mut self, enabled: bool) -> Self {
        self.reset_on_release = enabled;
        self
    }

    /// Set the delay between connection attempts after a failure.
    #[must_use]
    pub fn create_retry_backoff(mut self, backoff: Duration) -> Self {
        self.create_retry_backoff = backoff;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.connection_limit == 0 {
            return Err(PoolError::Configuration(
                "connection_limit must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.connection_limit {
            return Err(PoolError::Configuration(
                "min_connections cannot be greater than connection_limit".into(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, PoolError> {
    value
        .parse()
        .map_err(|_| PoolError::Configuration(format!("invalid value for {key}: {value}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, PoolError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(PoolError::Configuration(format!(
            "invalid value for {key}: {value}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.connection_limit, 10);
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.acquire_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.min_delay_validation, Duration::from_millis(500));
        assert!(config.reset_on_release);
    }

    #[test]
    fn test_config_builder_methods() {
        let config = PoolConfig::new()
            .connection_limit(50)
            .min_connections(5)
            .acquire_timeout(Duration::from_millis(200))
            .min_delay_validation(Duration::ZERO)
            .reset_on_release(false);

        assert_eq!(config.connection_limit, 50);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout, Some(Duration::from_millis(200)));
        assert!(config.min_delay_validation.is_zero());
        assert!(!config.reset_on_release);
    }

    #[test]
    fn test_zero_acquire_timeout_waits_forever() {
        let config = PoolConfig::new().acquire_timeout(Duration::ZERO);
        assert_eq!(config.acquire_timeout, None);
    }

    #[test]
    fn test_from_connection_string() {
        let config = PoolConfig::from_connection_string(
            "Server=db;User=app;Connection Limit=3;Acquire Timeout=250;Min Delay Validation=0;Min Connections=1",
        )
        .unwrap();

        assert_eq!(config.connection_limit, 3);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, Some(Duration::from_millis(250)));
        assert!(config.min_delay_validation.is_zero());
    }

    #[test]
    fn test_from_connection_string_zero_timeout() {
        let config = PoolConfig::from_connection_string("Acquire Timeout=0").unwrap();
        assert_eq!(config.acquire_timeout, None);
    }

    #[test]
    fn test_from_connection_string_invalid_number() {
        let err = PoolConfig::from_connection_string("Connection Limit=ten").unwrap_err();
        assert!(err.to_string().contains("invalid value for connection limit: ten"));
    }

    #[test]
    fn test_config_validation_min_greater_than_limit() {
        let err = PoolConfig::new()
            .connection_limit(2)
            .min_connections(3)
            .validate()
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("min_connections cannot be greater than connection_limit")
        );
    }

    #[test]
    fn test_config_validation_zero_limit() {
        let err = PoolConfig::new().connection_limit(0).validate().unwrap_err();
        assert!(err.to_string().contains("connection_limit must be greater than 0"));
    }

    #[test]
    fn test_config_equal_min_limit() {
        let config = PoolConfig::new().connection_limit(5).min_connections(5);
        assert!(config.validate().is_ok());
    }
}

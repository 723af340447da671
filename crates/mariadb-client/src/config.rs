//! Client configuration.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default MariaDB port.
pub const DEFAULT_PORT: u16 = 3306;

/// Configuration for connecting to a MariaDB server.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future releases without breaking semver. Use [`Config::default()`]
/// or [`Config::from_connection_string()`] to construct instances.
#[derive(Clone)]
#[non_exhaustive]
pub struct Config {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 3306).
    pub port: u16,

    /// User name.
    pub user: String,

    /// Password. Never printed by `Debug`.
    pub password: Option<String>,

    /// Default database.
    pub database: Option<String>,

    /// Application name reported as a connection attribute.
    pub application_name: String,

    /// Time allowed for the link to open and the handshake to finish.
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: "root".to_string(),
            password: None,
            database: None,
            application_name: "mariadb-client".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("application_name", &self.application_name)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Split a `key=value;` connection string into lower-cased keys and
/// trimmed values. Empty segments are skipped.
pub fn connection_string_pairs(conn_str: &str) -> Result<Vec<(String, &str)>> {
    conn_str
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::config(format!("invalid key-value: {part}")))?;
            Ok((key.trim().to_lowercase(), value.trim()))
        })
        .collect()
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string into configuration.
    ///
    /// ```text
    /// Server=localhost;Port=3306;Database=app;User=app;Password=secret;
    /// ```
    ///
    /// `Server` also accepts `host:port`. Unknown keys are ignored so that
    /// pool options can share the same string.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in connection_string_pairs(conn_str)? {
            match key.as_str() {
                "server" | "host" | "data source" => {
                    if let Some((host, port)) = value.rsplit_once(':') {
                        config.host = host.to_string();
                        config.port = parse_port(port)?;
                    } else {
                        config.host = value.to_string();
                    }
                }
                "port" => config.port = parse_port(value)?,
                "database" | "db" => config.database = Some(value.to_string()),
                "user" | "user id" | "uid" => config.user = value.to_string(),
                "password" | "pwd" => config.password = Some(value.to_string()),
                "application name" | "app" => config.application_name = value.to_string(),
                "connect timeout" | "connection timeout" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| Error::config(format!("invalid timeout: {value}")))?;
                    config.connect_timeout = Duration::from_secs(secs);
                }
                _ => {
                    tracing::debug!(
                        key = key.as_str(),
                        value = value,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the user name.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the default database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check the configuration for values that can never connect.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must be greater than 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be greater than 0"));
        }
        Ok(())
    }
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::config(format!("invalid port: {value}")))
}

//! Connection descriptors.
//!
//! Loading the descriptor from disk belongs to the calling tool; this module
//! only turns already-read key/value pairs or serde input into a validated
//! [`ConnectionConfig`].

use std::fmt;
use std::num::ParseIntError;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds a pooled connection may wait or idle before it is dropped.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Upper bound of pooled connections per catalog.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Errors raised while loading or validating a [`ConnectionConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required key was absent.
    #[error("connection property `{key}` is missing")]
    MissingKey {
        /// Name of the missing key.
        key: &'static str,
    },
    /// A numeric key held something else.
    #[error("connection property `{key}` must be a non-negative integer, got `{value}`")]
    InvalidNumber {
        /// Name of the offending key.
        key: &'static str,
        /// Raw value as loaded.
        value: String,
        /// Parser failure.
        #[source]
        source: ParseIntError,
    },
    /// The URL was empty.
    #[error("connection URL is empty")]
    EmptyUrl,
    /// The URL had no `scheme:` prefix to resolve a driver from.
    #[error("connection URL `{url}` has no scheme")]
    MissingScheme {
        /// The rejected URL.
        url: String,
    },
    /// A zero timeout would expire every connection immediately.
    #[error("connection timeout must be at least one second")]
    ZeroTimeout,
    /// A pool without connections cannot serve requests.
    #[error("connection pool size must be at least one")]
    ZeroPoolSize,
}

/// Resolved connection descriptor consumed by [`Catalog::create`](crate::Catalog::create).
///
/// # Examples
/// ```
/// use satcat_store::ConnectionConfig;
///
/// let config = ConnectionConfig::from_properties([
///     ("driverClassName", "org.h2.Driver"),
///     ("url", "jdbc:h2:mem:archive"),
///     ("timeout", "30"),
/// ])?;
/// assert_eq!(config.timeout().as_secs(), 30);
/// # Ok::<(), satcat_store::ConfigError>(())
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Driver hint carried over from the external descriptor. Resolution uses
    /// the URL scheme only.
    #[serde(default)]
    pub driver_class_name: Option<String>,
    /// Connection URL, e.g. `jdbc:postgresql://localhost:5432/satcat`.
    pub url: String,
    /// Login name.
    #[serde(default)]
    pub username: Option<String>,
    /// Login secret. Never printed by `Debug`.
    #[serde(default)]
    pub password: Option<String>,
    /// Pool wait and idle timeout in seconds.
    #[serde(rename = "timeout", default = "default_timeout")]
    pub timeout_secs: u64,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver_class_name", &self.driver_class_name)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl ConnectionConfig {
    /// Descriptor for `url` with default timeout and pool size and no
    /// credentials.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            driver_class_name: None,
            url: url.into(),
            username: None,
            password: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Attach login credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Override the timeout in seconds.
    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Override the pool size.
    #[must_use]
    pub const fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Pool wait and idle timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Credentials when both parts are present and non-empty.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() => Some((user, password)),
            _ => None,
        }
    }

    /// Build a descriptor from loaded key/value pairs.
    ///
    /// Recognised keys are `driverClassName`, `url`, `username`, `password`,
    /// `timeout` and `maxConnections`; other keys are ignored. The result is
    /// validated before it is returned.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingKey`] without a `url`,
    /// [`ConfigError::InvalidNumber`] for non-numeric `timeout` or
    /// `maxConnections`, and any error raised by [`Self::validate`].
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut url = None;
        let mut config = Self::new(String::new());
        for (key, raw) in properties {
            let value: String = raw.into();
            match key.as_ref().trim() {
                "driverClassName" => config.driver_class_name = Some(value.trim().to_owned()),
                "url" => url = Some(value.trim().to_owned()),
                "username" => config.username = Some(value.trim().to_owned()),
                "password" => config.password = Some(value),
                "timeout" => config.timeout_secs = parse_number("timeout", &value)?,
                "maxConnections" => {
                    config.max_connections = parse_number("maxConnections", &value)?;
                }
                _ => {}
            }
        }
        config.url = url.ok_or(ConfigError::MissingKey { key: "url" })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the descriptor before any driver is resolved.
    ///
    /// # Errors
    /// Returns [`ConfigError::EmptyUrl`], [`ConfigError::MissingScheme`],
    /// [`ConfigError::ZeroTimeout`] or [`ConfigError::ZeroPoolSize`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if !url.split_once(':').is_some_and(|(scheme, _)| !scheme.is_empty()) {
            return Err(ConfigError::MissingScheme {
                url: self.url.clone(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        Ok(())
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidNumber {
            key,
            value: value.to_owned(),
            source,
        })
}

//! Store connection and writer configuration

use crate::error::ConnectionError;
use serde::{Deserialize, Serialize};
use sqlx::any::AnyConnectOptions;
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::ConnectOptions;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Connection parameters for the PostgreSQL telemetry store
///
/// Every field is required. Values are checked each time a session is opened,
/// so a bad config fails the same way on every attempt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub login_id: String,
    pub login_password: String,
    pub database_name: String,
}

impl StoreConfig {
    /// Check that all parameters are present
    pub fn validate(&self) -> Result<(), ConnectionError> {
        let required = [
            ("host", &self.host),
            ("login_id", &self.login_id),
            ("login_password", &self.login_password),
            ("database_name", &self.database_name),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConnectionError::InvalidConfig(format!("{} is empty", field)));
        }
        if self.port == 0 {
            return Err(ConnectionError::InvalidConfig("port must be non-zero".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login_id", &self.login_id)
            .field("login_password", &"<redacted>")
            .field("database_name", &self.database_name)
            .finish()
    }
}

/// Which store a [`ConnectionManager`](crate::ConnectionManager) talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// Production PostgreSQL server
    Postgres(StoreConfig),
    /// Embedded SQLite file, created if missing
    Sqlite(PathBuf),
}

impl StoreTarget {
    /// Build driver options, rejecting incomplete configuration
    pub(crate) fn connect_options(&self) -> Result<AnyConnectOptions, ConnectionError> {
        match self {
            StoreTarget::Postgres(config) => {
                config.validate()?;
                let pg = PgConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.login_id)
                    .password(&config.login_password)
                    .database(&config.database_name);
                AnyConnectOptions::from_url(&pg.to_url_lossy())
                    .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))
            }
            StoreTarget::Sqlite(path) => {
                if path.as_os_str().is_empty() {
                    return Err(ConnectionError::InvalidConfig(
                        "database path cannot be empty".into(),
                    ));
                }
                // the driver percent-encodes the file name into the URL
                let sqlite = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true);
                AnyConnectOptions::from_url(&sqlite.to_url_lossy())
                    .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))
            }
        }
    }

    /// Human-readable location for log lines (never includes credentials)
    pub fn describe(&self) -> String {
        match self {
            StoreTarget::Postgres(c) => {
                format!("postgres://{}@{}:{}/{}", c.login_id, c.host, c.port, c.database_name)
            }
            StoreTarget::Sqlite(path) => format!("sqlite://{}", path.display()),
        }
    }
}

impl From<StoreConfig> for StoreTarget {
    fn from(config: StoreConfig) -> Self {
        StoreTarget::Postgres(config)
    }
}

/// Writer tuning: round-trip timeouts and store column limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    /// Upper bound for establishing a session (milliseconds)
    pub connect_timeout_ms: u64,
    /// Upper bound for a single statement round trip (milliseconds)
    pub statement_timeout_ms: u64,
    /// Maximum characters in a master record description
    pub max_description_len: usize,
    /// Maximum characters in a measured value
    pub max_value_len: usize,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            statement_timeout_ms: 5000,
            max_description_len: 1024,
            max_value_len: 256,
        }
    }
}

impl WriterSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

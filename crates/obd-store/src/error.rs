//! Store Error Types

use thiserror::Error;

/// Errors raised while establishing a session with the store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The store rejected the supplied credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The store could not be reached or dropped the session
    #[error("Network error: {0}")]
    Network(String),

    /// Connection parameters are missing or malformed
    #[error("Invalid connection config: {0}")]
    InvalidConfig(String),
}

/// Errors raised by telemetry writes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// No usable session could be obtained for the write
    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),

    /// The store refused or failed the statement
    #[error("Query failed: {detail}")]
    QueryFailed { detail: String },

    /// The store did not answer within the statement timeout
    #[error("Timeout waiting for store response after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Input was rejected before any round trip
    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),
}

impl WriteError {
    /// Short machine-readable reason, suitable for log fields
    pub fn reason(&self) -> &'static str {
        match self {
            WriteError::Connection(ConnectionError::Auth(_)) => "auth",
            WriteError::Connection(ConnectionError::Network(_)) => "network",
            WriteError::Connection(ConnectionError::InvalidConfig(_)) => "invalid-config",
            WriteError::QueryFailed { .. } => "query-failed",
            WriteError::Timeout { .. } => "timeout",
            WriteError::PreconditionViolated(_) => "precondition-violated",
        }
    }
}

/// SQLSTATE codes PostgreSQL uses for rejected logins
const AUTH_SQLSTATES: &[&str] = &["28000", "28P01"];

impl ConnectionError {
    /// Classify a failure returned while opening a session
    pub(crate) fn from_connect(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => ConnectionError::InvalidConfig(e.to_string()),
            sqlx::Error::Database(db) => {
                let auth = db
                    .code()
                    .is_some_and(|code| AUTH_SQLSTATES.contains(&&*code));
                if auth {
                    ConnectionError::Auth(db.message().to_string())
                } else {
                    ConnectionError::Network(db.message().to_string())
                }
            }
            other => ConnectionError::Network(other.to_string()),
        }
    }
}

/// Whether a statement failure means the session itself is no longer usable
pub(crate) fn is_connection_loss(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::PoolClosed
    )
}

impl From<sqlx::Error> for WriteError {
    fn from(err: sqlx::Error) -> Self {
        WriteError::QueryFailed {
            detail: err.to_string(),
        }
    }
}

//! Single shared store connection
//!
//! [`ConnectionManager`] owns at most one live session. All access goes
//! through an async mutex, so a writer holds the session exclusively from
//! `ensure_connected` until its last statement completes.

use crate::config::{StoreTarget, WriterSettings};
use crate::error::ConnectionError;
use serde::Serialize;
use sqlx::{AnyConnection, ConnectOptions, Connection};
use std::fmt;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Last known state of the shared session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Failed,
}

struct SessionState {
    status: ConnectionStatus,
    conn: Option<AnyConnection>,
}

/// Owner of the one connection to the telemetry store
pub struct ConnectionManager {
    target: StoreTarget,
    connect_timeout: Duration,
    state: Mutex<SessionState>,
}

impl ConnectionManager {
    /// Create a manager; no session is opened until first use
    pub fn new(target: impl Into<StoreTarget>, settings: &WriterSettings) -> Self {
        sqlx::any::install_default_drivers();

        let target = target.into();
        info!("Creating connection manager for {}", target.describe());
        Self {
            target,
            connect_timeout: settings.connect_timeout(),
            state: Mutex::new(SessionState {
                status: ConnectionStatus::Disconnected,
                conn: None,
            }),
        }
    }

    /// Store this manager connects to
    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    /// Open a fresh session, replacing any existing one
    pub async fn open(&self) -> Result<(), ConnectionError> {
        let mut session = self.session().await;
        session.close_handle().await;
        session.ensure_connected().await.map(|_| ())
    }

    /// Make sure a live session exists, opening one if the last status is not `Connected`
    pub async fn ensure_connected(&self) -> Result<(), ConnectionError> {
        self.session().await.ensure_connected().await.map(|_| ())
    }

    /// Release the session. Safe to call when already disconnected.
    pub async fn close(&self) {
        let mut session = self.session().await;
        if session.state.status == ConnectionStatus::Disconnected {
            debug!("Close requested while already disconnected");
            return;
        }
        session.close_handle().await;
        info!("Closed connection to {}", self.target.describe());
    }

    /// Current connection status
    pub async fn status(&self) -> ConnectionStatus {
        self.state.lock().await.status
    }

    /// Take exclusive access to the session slot
    pub(crate) async fn session(&self) -> Session<'_> {
        Session {
            manager: self,
            state: self.state.lock().await,
        }
    }

    async fn establish(&self) -> Result<AnyConnection, ConnectionError> {
        let options = self.target.connect_options()?;
        match tokio::time::timeout(self.connect_timeout, options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ConnectionError::from_connect(e)),
            Err(_) => Err(ConnectionError::Network(format!(
                "no response from {} within {}ms",
                self.target.describe(),
                self.connect_timeout.as_millis()
            ))),
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.target.describe())
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// Exclusive hold on the shared session for the length of one write
pub(crate) struct Session<'a> {
    manager: &'a ConnectionManager,
    state: MutexGuard<'a, SessionState>,
}

impl Session<'_> {
    /// Return the live connection, opening a new one unless the status is `Connected`
    pub(crate) async fn ensure_connected(&mut self) -> Result<&mut AnyConnection, ConnectionError> {
        if self.state.status != ConnectionStatus::Connected {
            // a failed or closed handle is never reused
            self.state.conn = None;
        }

        let conn = match self.state.conn.take() {
            Some(conn) => conn,
            None => match self.manager.establish().await {
                Ok(conn) => {
                    info!("Connected to {}", self.manager.target.describe());
                    conn
                }
                Err(e) => {
                    error!("Connection to {} failed: {}", self.manager.target.describe(), e);
                    self.state.status = ConnectionStatus::Failed;
                    return Err(e);
                }
            },
        };

        self.state.status = ConnectionStatus::Connected;
        Ok(self.state.conn.insert(conn))
    }

    /// Drop the handle after a session-level failure; the next write reconnects
    pub(crate) fn mark_failed(&mut self, reason: &str) {
        if self.state.conn.take().is_some() {
            warn!("Dropping connection to {}: {}", self.manager.target.describe(), reason);
        }
        self.state.status = ConnectionStatus::Failed;
    }

    async fn close_handle(&mut self) {
        if let Some(conn) = self.state.conn.take() {
            match tokio::time::timeout(self.manager.connect_timeout, conn.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Error while closing connection: {}", e),
                Err(_) => debug!("Timed out closing connection"),
            }
        }
        self.state.status = ConnectionStatus::Disconnected;
    }
}

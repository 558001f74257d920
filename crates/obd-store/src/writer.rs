//! Telemetry Writer
//!
//! Writes master records and their PID measurements through the shared
//! [`ConnectionManager`]. A master row always exists before any measurement
//! that references it, because measurement writes need a [`MasterId`] and a
//! `MasterId` is only produced by a successful master insert (or a caller
//! vouching for one via `TryFrom<i64>`, which the foreign key then checks).

use crate::config::WriterSettings;
use crate::connection::{ConnectionManager, Session};
use crate::error::{is_connection_loss, WriteError};
use crate::pid::{mode, PidCode, PidReading, Scenario};
use crate::statements::{INSERT_MASTER, INSERT_MEASUREMENT};
use serde::Serialize;
use sqlx::any::AnyArguments;
use sqlx::query::{Query, QueryScalar};
use sqlx::{Any, AnyConnection, Connection};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest VIN the master table accepts
pub const MAX_VIN_LEN: usize = 17;

/// Store-generated identifier of a master record (always >= 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MasterId(i64);

impl MasterId {
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for MasterId {
    type Error = WriteError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        if raw >= 1 {
            Ok(MasterId(raw))
        } else {
            Err(WriteError::PreconditionViolated(format!(
                "master id {} is not a store-generated identifier",
                raw
            )))
        }
    }
}

impl fmt::Display for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acknowledgement of a stored measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// Result of recording a whole collection episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Episode {
    pub master_id: MasterId,
    pub measurements: usize,
}

/// Failure of one bounded round trip, before it is mapped to a [`WriteError`]
enum RoundTripError {
    Store(sqlx::Error),
    Elapsed(Duration),
}

/// Run one round trip under the statement timeout
async fn bounded<T>(
    limit: Duration,
    round_trip: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, RoundTripError> {
    match tokio::time::timeout(limit, round_trip).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RoundTripError::Store(e)),
        Err(_) => Err(RoundTripError::Elapsed(limit)),
    }
}

fn master_query<'q>(
    vin: &'q str,
    scenario: Scenario,
    description: &'q str,
) -> QueryScalar<'q, Any, i64, AnyArguments<'q>> {
    sqlx::query_scalar::<Any, i64>(INSERT_MASTER)
        .bind(vin)
        .bind(i32::from(scenario.code()))
        .bind(description)
}

fn measurement_query<'q>(
    master_id: MasterId,
    service_mode: u8,
    pid: PidCode,
    value: &'q str,
) -> Query<'q, Any, AnyArguments<'q>> {
    sqlx::query::<Any>(INSERT_MEASUREMENT)
        .bind(master_id.get())
        .bind(i32::from(service_mode))
        .bind(pid.decimal())
        .bind(pid.hex())
        .bind(value)
}

async fn insert_master_row(
    conn: &mut AnyConnection,
    limit: Duration,
    master: (&str, Scenario, &str),
) -> Result<i64, RoundTripError> {
    let (vin, scenario, description) = master;
    let mut tx = bounded(limit, conn.begin()).await?;
    let raw_id = bounded(limit, master_query(vin, scenario, description).fetch_one(&mut *tx)).await?;
    bounded(limit, tx.commit()).await?;
    Ok(raw_id)
}

async fn insert_measurement_row(
    conn: &mut AnyConnection,
    limit: Duration,
    master_id: MasterId,
    service_mode: u8,
    pid: PidCode,
    value: &str,
) -> Result<(), RoundTripError> {
    let mut tx = bounded(limit, conn.begin()).await?;
    let query = measurement_query(master_id, service_mode, pid, value);
    bounded(limit, query.execute(&mut *tx)).await?;
    bounded(limit, tx.commit()).await?;
    Ok(())
}

async fn insert_rows(
    conn: &mut AnyConnection,
    limit: Duration,
    master_id: MasterId,
    service_mode: u8,
    readings: &[PidReading],
) -> Result<usize, RoundTripError> {
    let mut tx = bounded(limit, conn.begin()).await?;
    for reading in readings {
        let query = measurement_query(master_id, service_mode, reading.pid, &reading.value);
        bounded(limit, query.execute(&mut *tx)).await?;
    }
    bounded(limit, tx.commit()).await?;
    Ok(readings.len())
}

async fn insert_episode(
    conn: &mut AnyConnection,
    limit: Duration,
    master: (&str, Scenario, &str),
    service_mode: u8,
    readings: &[PidReading],
) -> Result<(i64, usize), RoundTripError> {
    let (vin, scenario, description) = master;
    let mut tx = bounded(limit, conn.begin()).await?;
    let raw_id = bounded(limit, master_query(vin, scenario, description).fetch_one(&mut *tx)).await?;
    let master_id = MasterId(raw_id);
    for reading in readings {
        let query = measurement_query(master_id, service_mode, reading.pid, &reading.value);
        bounded(limit, query.execute(&mut *tx)).await?;
    }
    bounded(limit, tx.commit()).await?;
    Ok((raw_id, readings.len()))
}

/// Persists OBD collection episodes
pub struct TelemetryWriter {
    connections: Arc<ConnectionManager>,
    settings: WriterSettings,
}

impl TelemetryWriter {
    /// Create a writer over an externally owned connection manager
    pub fn new(connections: Arc<ConnectionManager>, settings: WriterSettings) -> Self {
        Self {
            connections,
            settings,
        }
    }

    /// Connection manager this writer uses
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Insert a master record and return the identifier the store generated
    pub async fn insert_master(
        &self,
        vin: &str,
        scenario_code: u8,
        description: &str,
    ) -> Result<MasterId, WriteError> {
        let scenario = self.check_master(vin, scenario_code, description)?;

        let mut session = self.connections.session().await;
        let conn = session.ensure_connected().await?;
        let outcome = insert_master_row(
            conn,
            self.settings.statement_timeout(),
            (vin, scenario, description),
        )
        .await;

        let raw_id = outcome.map_err(|e| settle(&mut session, "master insert", e))?;
        let master_id = MasterId::try_from(raw_id).map_err(|_| WriteError::QueryFailed {
            detail: format!("store returned invalid master id {}", raw_id),
        })?;
        info!("Inserted master record {} for VIN {} ({:?})", master_id, vin, scenario);
        Ok(master_id)
    }

    /// Insert one PID measurement for an existing master record
    pub async fn insert_measurement(
        &self,
        master_id: MasterId,
        service_mode: u8,
        pid: impl Into<PidCode>,
        value: &str,
    ) -> Result<Ack, WriteError> {
        let pid = pid.into();
        self.check_mode(service_mode)?;
        self.check_value(value)?;

        let mut session = self.connections.session().await;
        let conn = session.ensure_connected().await?;
        let outcome = insert_measurement_row(
            conn,
            self.settings.statement_timeout(),
            master_id,
            service_mode,
            pid,
            value,
        )
        .await;

        outcome.map_err(|e| settle(&mut session, "measurement insert", e))?;
        debug!("Stored PID {} (mode {:02X}) for master {}", pid, service_mode, master_id);
        Ok(Ack)
    }

    /// Insert a batch of measurements in one transaction; all rows or none
    pub async fn insert_measurements(
        &self,
        master_id: MasterId,
        service_mode: u8,
        readings: &[PidReading],
    ) -> Result<usize, WriteError> {
        self.check_mode(service_mode)?;
        for reading in readings {
            self.check_value(&reading.value)?;
        }
        if readings.is_empty() {
            return Ok(0);
        }

        let mut session = self.connections.session().await;
        let conn = session.ensure_connected().await?;
        let outcome = insert_rows(
            conn,
            self.settings.statement_timeout(),
            master_id,
            service_mode,
            readings,
        )
        .await;

        let written = outcome.map_err(|e| settle(&mut session, "measurement batch", e))?;
        debug!("Stored {} measurements for master {}", written, master_id);
        Ok(written)
    }

    /// Record a master row and its measurements atomically
    pub async fn record_episode(
        &self,
        vin: &str,
        scenario_code: u8,
        description: &str,
        service_mode: u8,
        readings: &[PidReading],
    ) -> Result<Episode, WriteError> {
        let scenario = self.check_master(vin, scenario_code, description)?;
        self.check_mode(service_mode)?;
        for reading in readings {
            self.check_value(&reading.value)?;
        }

        let mut session = self.connections.session().await;
        let conn = session.ensure_connected().await?;
        let outcome = insert_episode(
            conn,
            self.settings.statement_timeout(),
            (vin, scenario, description),
            service_mode,
            readings,
        )
        .await;

        let (raw_id, measurements) = outcome.map_err(|e| settle(&mut session, "episode", e))?;
        let master_id = MasterId::try_from(raw_id).map_err(|_| WriteError::QueryFailed {
            detail: format!("store returned invalid master id {}", raw_id),
        })?;
        info!(
            "Recorded episode {} for VIN {} with {} measurements",
            master_id, vin, measurements
        );
        Ok(Episode {
            master_id,
            measurements,
        })
    }

    /// Release the shared connection
    pub async fn close_connection(&self) {
        self.connections.close().await;
    }

    fn check_master(
        &self,
        vin: &str,
        scenario_code: u8,
        description: &str,
    ) -> Result<Scenario, WriteError> {
        if vin.trim().is_empty() {
            return Err(WriteError::PreconditionViolated("VIN is empty".into()));
        }
        if vin.chars().count() > MAX_VIN_LEN {
            return Err(WriteError::PreconditionViolated(format!(
                "VIN longer than {} characters",
                MAX_VIN_LEN
            )));
        }
        if description.chars().count() > self.settings.max_description_len {
            return Err(WriteError::PreconditionViolated(format!(
                "description longer than {} characters",
                self.settings.max_description_len
            )));
        }
        Scenario::try_from(scenario_code).map_err(|code| {
            WriteError::PreconditionViolated(format!("unknown scenario code {}", code))
        })
    }

    fn check_mode(&self, service_mode: u8) -> Result<(), WriteError> {
        if mode::is_recognized(service_mode) {
            Ok(())
        } else {
            Err(WriteError::PreconditionViolated(format!(
                "unknown service mode {:02X}",
                service_mode
            )))
        }
    }

    fn check_value(&self, value: &str) -> Result<(), WriteError> {
        if value.chars().count() > self.settings.max_value_len {
            return Err(WriteError::PreconditionViolated(format!(
                "value longer than {} characters",
                self.settings.max_value_len
            )));
        }
        Ok(())
    }
}

/// Map a failed round trip to a [`WriteError`], dropping the session when it is unusable
fn settle(session: &mut Session<'_>, operation: &str, err: RoundTripError) -> WriteError {
    match err {
        RoundTripError::Elapsed(limit) => {
            session.mark_failed("statement timed out");
            warn!("{} timed out after {}ms", operation, limit.as_millis());
            WriteError::Timeout {
                after_ms: limit.as_millis() as u64,
            }
        }
        RoundTripError::Store(e) => {
            if is_connection_loss(&e) {
                session.mark_failed(&e.to_string());
            }
            warn!("{} failed: {}", operation, e);
            WriteError::from(e)
        }
    }
}

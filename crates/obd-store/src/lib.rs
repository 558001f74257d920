//! OBD Telemetry Store
//!
//! Persists OBD collection episodes: one master record per episode, with the
//! store generating its identifier, followed by PID measurement rows that
//! reference it.
//!
//! A single [`ConnectionManager`] owns the only session to the store and
//! serializes every write through it. [`TelemetryWriter`] validates input,
//! binds it into fixed statement templates and maps failures to
//! [`ConnectionError`] / [`WriteError`].

mod config;
mod connection;
mod error;
mod pid;
mod statements;
mod writer;

pub use config::{StoreConfig, StoreTarget, WriterSettings};
pub use connection::{ConnectionManager, ConnectionStatus};
pub use error::{ConnectionError, WriteError};
pub use pid::{mode, Pid, PidCode, PidReading, Scenario};
pub use writer::{Ack, Episode, MasterId, TelemetryWriter, MAX_VIN_LEN};

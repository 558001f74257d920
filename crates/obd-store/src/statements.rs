//! Fixed statement templates
//!
//! Caller data only ever travels as bound parameters. The store assigns
//! `master_id` and both `registered_at` columns.

/// Insert one master record and return its generated identifier
pub(crate) const INSERT_MASTER: &str = "INSERT INTO obd_master (vin, scenario_code, description) \
     VALUES ($1, $2, $3) RETURNING master_id";

/// Insert one PID measurement for an existing master record
pub(crate) const INSERT_MEASUREMENT: &str = "INSERT INTO obd_pid_measurement \
     (master_id, service_mode, pid_decimal, pid_hex, value) VALUES ($1, $2, $3, $4, $5)";

//! OBD Telemetry Ingest
//!
//! Process wiring around `obd-store`: logging setup, environment
//! configuration and parsing of the `pid:value` payloads devices upload.

use obd_store::{PidCode, PidReading, StoreConfig, WriterSettings};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment prefix for store connection parameters (`OBD_DB_HOST`, ...)
pub const STORE_ENV_PREFIX: &str = "OBD_DB";

/// Environment prefix for writer tuning (`OBD_WRITER_STATEMENT_TIMEOUT_MS`, ...)
pub const WRITER_ENV_PREFIX: &str = "OBD_WRITER";

/// Command-line usage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid scenario code: {0}")]
    InvalidScenario(String),
}

/// Initialize logging
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Load store connection parameters from `<prefix>_*` environment variables
pub fn load_store_config(prefix: &str) -> Result<StoreConfig, config::ConfigError> {
    config::Config::builder()
        .add_source(config::Environment::with_prefix(prefix).try_parsing(true))
        .build()?
        .try_deserialize()
}

/// Load writer settings, falling back to defaults for unset variables
pub fn load_writer_settings(prefix: &str) -> Result<WriterSettings, config::ConfigError> {
    config::Config::builder()
        .add_source(config::Environment::with_prefix(prefix).try_parsing(true))
        .build()?
        .try_deserialize()
}

/// Decoded device payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Device tick carried by PID 0
    pub device_tick: Option<u64>,
    /// Readings that followed the tick
    pub readings: Vec<PidReading>,
}

/// Parse a comma separated `pid:value` list, PIDs in hex
///
/// PID 0 carries the device tick; a zero tick counts as no tick. Readings are
/// only kept once a nonzero tick has been seen. Malformed entries are skipped.
pub fn parse_payload(payload: &str) -> Payload {
    let mut parsed = Payload::default();

    for part in payload.split(',') {
        let Some((pid, value)) = part.split_once(':') else {
            continue;
        };
        let Some(pid) = PidCode::parse_hex(pid) else {
            debug!("Skipping entry with bad PID: {}", part);
            continue;
        };

        if pid == PidCode(0) {
            parsed.device_tick = value.trim().parse().ok().filter(|tick| *tick != 0);
            continue;
        }
        if parsed.device_tick.is_none() {
            continue;
        }
        parsed.readings.push(PidReading::new(pid, value.trim()));
    }

    parsed
}

/// One ingest invocation: `<vin> <scenario> <description> [payload]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub vin: String,
    pub scenario_code: u8,
    pub description: String,
    pub payload: Payload,
}

impl IngestRequest {
    /// Build a request from command-line arguments (program name excluded)
    pub fn from_args<I>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let vin = args.next().ok_or(UsageError::MissingArgument("vin"))?;
        let scenario = args.next().ok_or(UsageError::MissingArgument("scenario"))?;
        let scenario_code = scenario
            .parse()
            .map_err(|_| UsageError::InvalidScenario(scenario.clone()))?;
        let description = args
            .next()
            .ok_or(UsageError::MissingArgument("description"))?;
        let payload = args.next().map(|p| parse_payload(&p)).unwrap_or_default();

        Ok(Self {
            vin,
            scenario_code,
            description,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_store::Pid;

    #[test]
    fn test_parse_payload() {
        let payload = parse_payload("0:123456,0C:2500,0D:60,104:17");
        assert_eq!(payload.device_tick, Some(123456));
        assert_eq!(
            payload.readings,
            vec![
                PidReading::new(Pid::Rpm, "2500"),
                PidReading::new(Pid::Speed, "60"),
                PidReading::new(0x104u16, "17"),
            ]
        );
    }

    #[test]
    fn test_readings_before_tick_are_dropped() {
        let payload = parse_payload("0C:900,0:10,0D:12");
        assert_eq!(payload.readings, vec![PidReading::new(Pid::Speed, "12")]);
    }

    #[test]
    fn test_zero_tick_is_no_tick() {
        let payload = parse_payload("0:0,0C:900");
        assert_eq!(payload.device_tick, None);
        assert!(payload.readings.is_empty());

        let payload = parse_payload("0:0,0C:900,0:5,0D:40");
        assert_eq!(payload.device_tick, Some(5));
        assert_eq!(payload.readings, vec![PidReading::new(Pid::Speed, "40")]);
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let payload = parse_payload("0:1,garbage,zz:1,0C:800,");
        assert_eq!(payload.readings, vec![PidReading::new(Pid::Rpm, "800")]);
    }

    #[test]
    fn test_request_from_args() {
        let args = ["KMHXX00XXXX000001", "1", "trip-start", "0:5,0C:2500"]
            .map(String::from);
        let request = IngestRequest::from_args(args).unwrap();
        assert_eq!(request.scenario_code, 1);
        assert_eq!(request.payload.readings.len(), 1);
    }

    #[test]
    fn test_request_missing_description() {
        let args = ["KMHXX00XXXX000001", "1"].map(String::from);
        assert_eq!(
            IngestRequest::from_args(args),
            Err(UsageError::MissingArgument("description"))
        );
    }

    #[test]
    fn test_request_bad_scenario() {
        let args = ["KMHXX00XXXX000001", "drive", "x"].map(String::from);
        assert!(matches!(
            IngestRequest::from_args(args),
            Err(UsageError::InvalidScenario(_))
        ));
    }

    #[test]
    fn test_store_config_from_env() {
        std::env::set_var("OBD_TEST_STORE_HOST", "db.internal");
        std::env::set_var("OBD_TEST_STORE_PORT", "5433");
        std::env::set_var("OBD_TEST_STORE_LOGIN_ID", "telemetry");
        std::env::set_var("OBD_TEST_STORE_LOGIN_PASSWORD", "pw");
        std::env::set_var("OBD_TEST_STORE_DATABASE_NAME", "obd");

        let config = load_store_config("OBD_TEST_STORE").unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5433);
        assert_eq!(config.database_name, "obd");
    }

    #[test]
    fn test_missing_store_config_is_error() {
        assert!(load_store_config("OBD_TEST_UNSET").is_err());
    }

    #[test]
    fn test_writer_settings_defaults_and_override() {
        std::env::set_var("OBD_TEST_WRITER_STATEMENT_TIMEOUT_MS", "750");
        let settings = load_writer_settings("OBD_TEST_WRITER").unwrap();
        assert_eq!(settings.statement_timeout_ms, 750);
        assert_eq!(settings.max_value_len, WriterSettings::default().max_value_len);
    }
}

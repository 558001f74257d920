//! OBD Telemetry Ingest - Main Entry Point
//!
//! Usage: `obd-ingest <vin> <scenario> <description> [0:<tick>,<pid>:<value>,...]`

use anyhow::Context;
use obd_ingest::{
    init_logging, load_store_config, load_writer_settings, IngestRequest, STORE_ENV_PREFIX,
    WRITER_ENV_PREFIX,
};
use obd_store::{mode, ConnectionManager, TelemetryWriter};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== OBD Telemetry Ingest v{} ===", env!("CARGO_PKG_VERSION"));

    let request = IngestRequest::from_args(std::env::args().skip(1))?;
    let store = load_store_config(STORE_ENV_PREFIX).context("loading store configuration")?;
    let settings = load_writer_settings(WRITER_ENV_PREFIX).context("loading writer settings")?;

    let connections = Arc::new(ConnectionManager::new(store, &settings));
    let writer = TelemetryWriter::new(connections, settings);

    let result = writer
        .record_episode(
            &request.vin,
            request.scenario_code,
            &request.description,
            mode::CURRENT_DATA,
            &request.payload.readings,
        )
        .await;
    writer.close_connection().await;

    match result {
        Ok(episode) => {
            info!(
                "Stored episode {} ({} measurements)",
                episode.master_id, episode.measurements
            );
            println!("{}", episode.master_id);
            Ok(())
        }
        Err(e) => {
            error!("Ingest failed ({}): {}", e.reason(), e);
            Err(e.into())
        }
    }
}

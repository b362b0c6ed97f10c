//! Ingestion server binary.
//!
//! Loads the configuration, initializes tracing and runs one streaming worker per configured
//! destination, fed with newline-delimited JSON events from standard input.

use ingest_config::shared::ServerConfig;
use ingest_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_server_config;
use crate::core::start_server_with_config;
use crate::error::{ServerError, ServerResult};

mod config;
mod core;
mod error;

/// Entry point for the ingestion server.
fn main() -> ServerResult<()> {
    let server_config = load_server_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(ServerError::config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async_main(server_config));
    // Standard input is read on a blocking thread that cannot be interrupted.
    runtime.shutdown_background();

    result
}

async fn async_main(server_config: ServerConfig) -> ServerResult<()> {
    if let Err(err) = start_server_with_config(server_config).await {
        let err = ServerError::from(err);
        error!("{}", err.render_report());

        return Err(err);
    }

    Ok(())
}

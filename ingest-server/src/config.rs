use ingest_config::load_config;
use ingest_config::shared::ServerConfig;

use crate::error::{ServerError, ServerResult};

/// Loads and validates the server configuration.
pub fn load_server_config() -> ServerResult<ServerConfig> {
    let config = load_config::<ServerConfig>().map_err(ServerError::config)?;
    config.validate().map_err(ServerError::config)?;

    Ok(config)
}

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{DestinationConfig, ValidationError};

/// Where permanently failed records are written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Directory holding one append-only fallback log per destination.
    #[serde(default = "default_fallback_directory")]
    pub directory: PathBuf,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            directory: default_fallback_directory(),
        }
    }
}

/// Top-level configuration of the ingestion server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl ServerConfig {
    /// Validates every destination and rejects duplicate ids.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.destinations.is_empty() {
            return Err(ValidationError::NoDestinations);
        }

        let mut seen = HashSet::new();
        for destination in &self.destinations {
            destination.validate()?;

            if !seen.insert(destination.id.as_str()) {
                return Err(ValidationError::DuplicateDestinationId(
                    destination.id.clone(),
                ));
            }
        }

        Ok(())
    }
}

impl Config for ServerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_fallback_directory() -> PathBuf {
    PathBuf::from("fallback")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::DestinationKind;

    #[test]
    fn rejects_duplicate_destination_ids() {
        let config = ServerConfig {
            destinations: vec![
                DestinationConfig::new("pg", DestinationKind::Postgres),
                DestinationConfig::new("pg", DestinationKind::ClickHouse),
            ],
            fallback: FallbackConfig::default(),
        };

        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateDestinationId(id)) if id == "pg"
        ));
    }

    #[test]
    fn rejects_empty_destinations() {
        let config = ServerConfig {
            destinations: vec![],
            fallback: FallbackConfig::default(),
        };

        assert!(matches!(
            config.validate(),
            Err(ValidationError::NoDestinations)
        ));
    }
}

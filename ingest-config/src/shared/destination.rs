use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::shared::{MappingConfig, ValidationError};

/// Kind of engine a destination writes to.
///
/// The kind selects the default column type mapping and the default maximum column name length.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Postgres,
    Redshift,
    ClickHouse,
    BigQuery,
    Snowflake,
    MySql,
    /// In-process destination used for local runs and tests.
    Memory,
}

impl DestinationKind {
    /// Returns `true` for destinations backed by a SQL engine.
    ///
    /// Records routed to SQL destinations are stamped with a unique id and an ingestion
    /// timestamp before flattening.
    pub fn is_sql(&self) -> bool {
        !matches!(self, DestinationKind::Memory)
    }

    /// Returns the identifier length limit of the engine, `0` meaning unlimited.
    pub fn default_max_column_name_length(&self) -> usize {
        match self {
            DestinationKind::Postgres => 63,
            DestinationKind::Redshift => 127,
            DestinationKind::ClickHouse => 0,
            DestinationKind::BigQuery => 300,
            DestinationKind::Snowflake => 255,
            DestinationKind::MySql => 64,
            DestinationKind::Memory => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Postgres => "postgres",
            DestinationKind::Redshift => "redshift",
            DestinationKind::ClickHouse => "click_house",
            DestinationKind::BigQuery => "big_query",
            DestinationKind::Snowflake => "snowflake",
            DestinationKind::MySql => "my_sql",
            DestinationKind::Memory => "memory",
        }
    }
}

/// Logical field type names usable in configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Unknown,
    Bool,
    Int64,
    Float64,
    String,
    Timestamp,
}

/// Toggles the per-destination events cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventsCacheConfig {
    #[serde(default = "default_events_cache_enabled")]
    pub enabled: bool,
}

impl Default for EventsCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_events_cache_enabled(),
        }
    }
}

/// Configuration of a single destination.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Unique identifier of the destination, used for locking, accounting and fallback files.
    pub id: String,
    pub kind: DestinationKind,
    /// Staging destinations never consume from the streaming queue.
    #[serde(default)]
    pub staging: bool,
    /// Template evaluated against every record to obtain the table name.
    #[serde(default = "default_table_name_template")]
    pub table_name_template: String,
    #[serde(default)]
    pub primary_key_fields: Vec<String>,
    /// Drops an existing primary key when no primary key fields are configured.
    #[serde(default)]
    pub remove_primary_key: bool,
    /// Overrides the kind's identifier length limit.
    #[serde(default)]
    pub max_column_name_length: Option<usize>,
    /// Overrides of the kind's logical type to SQL type mapping.
    #[serde(default)]
    pub column_types: HashMap<FieldType, String>,
    /// Explicit logical types for fields, keyed by flattened field name.
    #[serde(default)]
    pub default_types: HashMap<String, FieldType>,
    #[serde(default)]
    pub mapping: MappingConfig,
    /// Path of the field carrying the unique event id.
    #[serde(default = "default_unique_id_field")]
    pub unique_id_field: String,
    /// Keeps null values as fields instead of dropping them while flattening.
    #[serde(default)]
    pub store_nulls: bool,
    /// Aborts a whole batch on the first per-record processing error.
    #[serde(default)]
    pub break_on_error: bool,
    /// Delay before a record failing with a connection error is retried.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub events_cache: EventsCacheConfig,
}

impl DestinationConfig {
    /// Default delay before retrying a record after a connection error.
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 20_000;

    /// Largest accepted retry delay, one day.
    pub const MAX_RETRY_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

    /// Default path of the unique event id field.
    pub const DEFAULT_UNIQUE_ID_FIELD: &'static str = "/event_id";

    /// Default table name template.
    pub const DEFAULT_TABLE_NAME_TEMPLATE: &'static str = "events";

    /// Creates a configuration with defaults for everything but id and kind.
    pub fn new(id: impl Into<String>, kind: DestinationKind) -> Self {
        Self {
            id: id.into(),
            kind,
            staging: false,
            table_name_template: default_table_name_template(),
            primary_key_fields: Vec::new(),
            remove_primary_key: false,
            max_column_name_length: None,
            column_types: HashMap::new(),
            default_types: HashMap::new(),
            mapping: MappingConfig::default(),
            unique_id_field: default_unique_id_field(),
            store_nulls: false,
            break_on_error: false,
            retry_delay_ms: default_retry_delay_ms(),
            events_cache: EventsCacheConfig::default(),
        }
    }

    /// Returns the effective maximum column name length, `0` meaning unlimited.
    pub fn max_column_name_length(&self) -> usize {
        self.max_column_name_length
            .unwrap_or_else(|| self.kind.default_max_column_name_length())
    }

    /// Validates the destination configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "destinations.id".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.table_name_template.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("destinations.{}.table_name_template", self.id),
                constraint: "must not be empty".to_string(),
            });
        }

        if !self.unique_id_field.starts_with('/') || self.unique_id_field.len() < 2 {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("destinations.{}.unique_id_field", self.id),
                constraint: "must be a path such as `/event_id`".to_string(),
            });
        }

        if self.retry_delay_ms > Self::MAX_RETRY_DELAY_MS {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("destinations.{}.retry_delay_ms", self.id),
                constraint: format!("must be at most {}", Self::MAX_RETRY_DELAY_MS),
            });
        }

        if let Some((field, _)) = self
            .default_types
            .iter()
            .find(|(_, typ)| **typ == FieldType::Unknown)
        {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("destinations.{}.default_types.{field}", self.id),
                constraint: "`unknown` cannot be used as an explicit type".to_string(),
            });
        }

        self.mapping.validate(&self.id)
    }
}

fn default_table_name_template() -> String {
    DestinationConfig::DEFAULT_TABLE_NAME_TEMPLATE.to_string()
}

fn default_unique_id_field() -> String {
    DestinationConfig::DEFAULT_UNIQUE_ID_FIELD.to_string()
}

fn default_retry_delay_ms() -> u64 {
    DestinationConfig::DEFAULT_RETRY_DELAY_MS
}

fn default_events_cache_enabled() -> bool {
    true
}

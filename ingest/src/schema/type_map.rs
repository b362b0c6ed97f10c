use std::collections::HashMap;

use ingest_config::shared::{DestinationKind, FieldType};

use crate::types::DataType;

/// Maps logical field types to the SQL types of one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMap {
    types: HashMap<DataType, String>,
}

impl TypeMap {
    /// Returns the default mapping of a destination kind.
    ///
    /// [`DataType::Unknown`] is never mapped by default.
    pub fn for_kind(kind: DestinationKind) -> Self {
        let [bool_type, int_type, float_type, string_type, timestamp_type] = match kind {
            DestinationKind::Postgres => {
                ["boolean", "bigint", "double precision", "text", "timestamp"]
            }
            DestinationKind::Redshift => [
                "boolean",
                "bigint",
                "double precision",
                "character varying(65535)",
                "timestamp",
            ],
            DestinationKind::ClickHouse => ["UInt8", "Int64", "Float64", "String", "DateTime"],
            DestinationKind::BigQuery => ["BOOLEAN", "INTEGER", "FLOAT", "STRING", "TIMESTAMP"],
            DestinationKind::Snowflake => {
                ["boolean", "bigint", "double precision", "text", "timestamp(6)"]
            }
            DestinationKind::MySql => ["BOOLEAN", "BIGINT", "DOUBLE", "TEXT", "DATETIME(6)"],
            DestinationKind::Memory => ["bool", "int64", "float64", "string", "timestamp"],
        };

        let types = [
            (DataType::Bool, bool_type),
            (DataType::Int64, int_type),
            (DataType::Float64, float_type),
            (DataType::String, string_type),
            (DataType::Timestamp, timestamp_type),
        ]
        .into_iter()
        .map(|(data_type, sql_type)| (data_type, sql_type.to_string()))
        .collect();

        Self { types }
    }

    /// Returns the default mapping of `kind` with the configured overrides applied.
    pub fn with_overrides(kind: DestinationKind, overrides: &HashMap<FieldType, String>) -> Self {
        let mut map = Self::for_kind(kind);
        for (field_type, sql_type) in overrides {
            map.types
                .insert(DataType::from(*field_type), sql_type.clone());
        }

        map
    }

    pub fn sql_type(&self, data_type: DataType) -> Option<&str> {
        self.types.get(&data_type).map(String::as_str)
    }
}

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{ErrorKind, IngestResult};
use crate::schema::column_name::normalize_name;
use crate::types::{DataType, Field, Record, SqlTypeSuggestion, Value, format_timestamp};
use crate::{bail, ingest_error};

/// Prefix of pseudo-fields carrying a SQL type for the field named by the rest of the key.
pub const SQL_TYPE_PREFIX: &str = "__sql_type_";

/// Layouts of timestamps without offset, interpreted as UTC.
const NAIVE_TIMESTAMP_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S%.fZ",
];

/// Layouts of timestamps with offset besides RFC 3339 itself.
const OFFSET_TIMESTAMP_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parses a string in one of the supported timestamp layouts.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    // Cheap rejection of strings that cannot be timestamps.
    let bytes = value.as_bytes();
    if bytes.len() < 19 || !bytes[..4].iter().all(u8::is_ascii_digit) || bytes[4] != b'-' {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for layout in OFFSET_TIMESTAMP_LAYOUTS {
        if let Ok(parsed) = DateTime::parse_from_str(value, layout) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for layout in NAIVE_TIMESTAMP_LAYOUTS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, layout) {
            return Some(parsed.and_utc());
        }
    }

    None
}

/// Infers field types of flat records and reformats values to match them.
#[derive(Debug, Clone, Default)]
pub struct TypeResolver {
    default_types: HashMap<String, DataType>,
}

impl TypeResolver {
    /// Creates a resolver forcing the given types on the named fields.
    pub fn new(default_types: HashMap<String, DataType>) -> Self {
        let default_types = default_types
            .into_iter()
            .map(|(name, data_type)| (normalize_name(&name), data_type))
            .collect();

        Self { default_types }
    }

    /// Resolves the fields of a flat record, rewriting its values in place.
    ///
    /// SQL type pseudo-fields are removed from the record and attached to their target field.
    /// A configured default type wins over such a suggestion, which wins over inference.
    pub fn resolve(&self, record: &mut Record) -> IngestResult<BTreeMap<String, Field>> {
        let suggestions = extract_suggestions(record)?;
        let mut fields = BTreeMap::new();

        for (name, value) in record.iter_mut() {
            if value.is_null() {
                continue;
            }

            if let Some(data_type) = self.default_types.get(name) {
                *value = coerce(name, value, *data_type)?;
                fields.insert(name.clone(), Field::new(*data_type));
                continue;
            }

            let data_type = infer(value)?;
            let field = Field::new(data_type).with_suggestion(suggestions.get(name).cloned());
            fields.insert(name.clone(), field);
        }

        // Suggestions for fields without a value still define their column.
        for (name, suggestion) in suggestions {
            if self.default_types.contains_key(&name) || fields.contains_key(&name) {
                continue;
            }
            fields.insert(name, Field::suggested(suggestion));
        }

        Ok(fields)
    }
}

/// Removes SQL type pseudo-fields from the record and returns their suggestions by target field.
fn extract_suggestions(record: &mut Record) -> IngestResult<HashMap<String, SqlTypeSuggestion>> {
    let keys: Vec<String> = record
        .keys()
        .filter(|key| key.starts_with(SQL_TYPE_PREFIX))
        .cloned()
        .collect();

    let mut suggestions = HashMap::with_capacity(keys.len());
    for key in keys {
        let Some(value) = record.remove(&key) else {
            continue;
        };

        let target = normalize_name(&key[SQL_TYPE_PREFIX.len()..]);
        let suggestion = match value {
            Value::String(sql_type) => SqlTypeSuggestion {
                sql_type,
                column_type: None,
            },
            Value::Array(values) => match values.as_slice() {
                [Value::String(sql_type), Value::String(column_type)] => SqlTypeSuggestion {
                    sql_type: sql_type.clone(),
                    column_type: Some(column_type.clone()),
                },
                _ => bail!(
                    ErrorKind::InvalidData,
                    "Invalid SQL type override",
                    format!("`{key}` must be a type name or a [type, column type] pair")
                ),
            },
            other => bail!(
                ErrorKind::InvalidData,
                "Invalid SQL type override",
                format!(
                    "`{key}` must be a type name or a [type, column type] pair, got `{}`",
                    other.kind_name()
                )
            ),
        };

        suggestions.insert(target, suggestion);
    }

    Ok(suggestions)
}

/// Infers the type of a value, reformatting generic numbers and timestamp strings.
fn infer(value: &mut Value) -> IngestResult<DataType> {
    let data_type = match value {
        Value::Null | Value::Object(_) | Value::Array(_) => DataType::Unknown,
        Value::Bool(_) => DataType::Bool,
        Value::Int(_) => DataType::Int64,
        Value::Float(_) => DataType::Float64,
        Value::Timestamp(_) => DataType::Timestamp,
        Value::Number(literal) => {
            *value = parse_number(literal)?;
            match value {
                Value::Int(_) => DataType::Int64,
                _ => DataType::Float64,
            }
        }
        Value::String(text) => match parse_timestamp(text) {
            Some(timestamp) => {
                *value = Value::Timestamp(timestamp);
                DataType::Timestamp
            }
            None => DataType::String,
        },
    };

    Ok(data_type)
}

/// Parses a numeric literal: integers stay integers unless they overflow `i64`.
fn parse_number(literal: &str) -> IngestResult<Value> {
    if !literal.contains(['.', 'e', 'E'])
        && let Ok(int) = literal.parse::<i64>()
    {
        return Ok(Value::Int(int));
    }

    Ok(Value::Float(literal.parse::<f64>()?))
}

/// Converts a value to the given type.
fn coerce(name: &str, value: &Value, data_type: DataType) -> IngestResult<Value> {
    let converted = match (data_type, value) {
        (DataType::Unknown, value) => Some(value.clone()),

        (DataType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (DataType::Bool, Value::String(text)) => match text.trim().to_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (DataType::Bool, Value::Int(i)) if *i == 0 || *i == 1 => Some(Value::Bool(*i == 1)),
        (DataType::Bool, Value::Number(literal)) => match literal.as_str() {
            "0" => Some(Value::Bool(false)),
            "1" => Some(Value::Bool(true)),
            _ => None,
        },

        (DataType::Int64, Value::Int(i)) => Some(Value::Int(*i)),
        (DataType::Int64, Value::Bool(b)) => Some(Value::Int(i64::from(*b))),
        (DataType::Int64, Value::Float(f)) => float_to_int(*f),
        (DataType::Int64, Value::Number(literal)) => literal
            .parse::<i64>()
            .ok()
            .map(Value::Int)
            .or_else(|| literal.parse::<f64>().ok().and_then(float_to_int)),
        (DataType::Int64, Value::String(text)) => text.trim().parse::<i64>().ok().map(Value::Int),

        (DataType::Float64, Value::Float(f)) => Some(Value::Float(*f)),
        (DataType::Float64, Value::Int(i)) => Some(Value::Float(*i as f64)),
        (DataType::Float64, Value::Number(literal)) => {
            literal.parse::<f64>().ok().map(Value::Float)
        }
        (DataType::Float64, Value::String(text)) => {
            text.trim().parse::<f64>().ok().map(Value::Float)
        }

        (DataType::String, Value::String(text)) => Some(Value::String(text.clone())),
        (DataType::String, Value::Timestamp(timestamp)) => {
            Some(Value::String(format_timestamp(timestamp)))
        }
        (DataType::String, other) => Some(Value::String(other.to_string())),

        (DataType::Timestamp, Value::Timestamp(timestamp)) => Some(Value::Timestamp(*timestamp)),
        (DataType::Timestamp, Value::String(text)) => parse_timestamp(text).map(Value::Timestamp),

        _ => None,
    };

    converted.ok_or_else(|| {
        ingest_error!(
            ErrorKind::ConversionError,
            "Value cannot be converted to the configured type",
            format!(
                "field `{name}`: cannot convert {} `{value}` to {data_type}",
                value.kind_name()
            )
        )
    })
}

fn float_to_int(value: f64) -> Option<Value> {
    (value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64)
        .then_some(Value::Int(value as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(entries: &[(&str, Value)]) -> Record {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn number(literal: &str) -> Value {
        Value::Number(literal.to_string())
    }

    #[test]
    fn numbers_become_ints_or_floats() {
        let mut flat = record(&[
            ("int", number("42")),
            ("float", number("4.2")),
            ("exp", number("1e3")),
            ("huge", number("92233720368547758070")),
        ]);

        let fields = TypeResolver::default().resolve(&mut flat).unwrap();

        assert_eq!(flat["int"], Value::Int(42));
        assert_eq!(flat["float"], Value::Float(4.2));
        assert_eq!(flat["exp"], Value::Float(1000.0));
        assert_eq!(fields["int"].resolved_type(), DataType::Int64);
        assert_eq!(fields["float"].resolved_type(), DataType::Float64);
        assert_eq!(fields["huge"].resolved_type(), DataType::Float64);
    }

    #[test]
    fn timestamps_are_recognized() {
        let expected = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();

        for text in [
            "2021-01-01T00:00:00Z",
            "2021-01-01T00:00:00.000Z",
            "2021-01-01T02:00:00+02:00",
            "2021-01-01T00:00:00",
            "2021-01-01 00:00:00",
            "2021-01-01 00:00:00.000000",
            "2021-01-01 00:00:00+00:00",
        ] {
            assert_eq!(parse_timestamp(text), Some(expected), "{text}");
        }

        assert_eq!(parse_timestamp("2021"), None);
        assert_eq!(parse_timestamp("not a timestamp at all"), None);
    }

    #[test]
    fn nulls_produce_no_field() {
        let mut flat = record(&[("a", Value::Null), ("b", Value::from("x"))]);

        let fields = TypeResolver::default().resolve(&mut flat).unwrap();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn unmatched_values_are_unknown() {
        let mut flat = record(&[("list", Value::Array(vec![]))]);

        let fields = TypeResolver::default().resolve(&mut flat).unwrap();
        assert_eq!(fields["list"].resolved_type(), DataType::Unknown);
    }

    #[test]
    fn sql_type_overrides_become_suggestions() {
        let mut flat = record(&[
            ("amount", number("10")),
            ("__sql_type_amount", Value::from("numeric(10,2)")),
            (
                "__sql_type_Code",
                Value::Array(vec![Value::from("varchar"), Value::from("varchar(3)")]),
            ),
        ]);

        let fields = TypeResolver::default().resolve(&mut flat).unwrap();

        assert!(!flat.contains_key("__sql_type_amount"));
        assert!(!flat.contains_key("__sql_type_Code"));
        assert_eq!(
            fields["amount"].suggestion().map(|s| s.sql_type.as_str()),
            Some("numeric(10,2)")
        );
        assert_eq!(
            fields["code"].suggestion().and_then(|s| s.column_type.as_deref()),
            Some("varchar(3)")
        );
        assert_eq!(fields["code"].resolved_type(), DataType::Unknown);
    }

    #[test]
    fn malformed_overrides_are_invalid_data() {
        let mut flat = record(&[("__sql_type_a", Value::Int(1))]);

        let err = TypeResolver::default().resolve(&mut flat).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn default_types_win_over_overrides() {
        let resolver =
            TypeResolver::new(HashMap::from([("amount".to_string(), DataType::String)]));
        let mut flat = record(&[
            ("amount", number("10")),
            ("__sql_type_amount", Value::from("numeric")),
        ]);

        let fields = resolver.resolve(&mut flat).unwrap();

        assert_eq!(flat["amount"], Value::from("10"));
        assert_eq!(fields["amount"].resolved_type(), DataType::String);
        assert!(fields["amount"].suggestion().is_none());
    }

    #[test]
    fn default_types_coerce_values() {
        let resolver = TypeResolver::new(HashMap::from([
            ("count".to_string(), DataType::Int64),
            ("ratio".to_string(), DataType::Float64),
            ("flag".to_string(), DataType::Bool),
            ("at".to_string(), DataType::Timestamp),
        ]));
        let mut flat = record(&[
            ("count", Value::from(" 12 ")),
            ("ratio", number("1")),
            ("flag", Value::from("TRUE")),
            ("at", Value::from("2021-01-01 00:00:00")),
        ]);

        resolver.resolve(&mut flat).unwrap();

        assert_eq!(flat["count"], Value::Int(12));
        assert_eq!(flat["ratio"], Value::Float(1.0));
        assert_eq!(flat["flag"], Value::Bool(true));
        assert!(matches!(flat["at"], Value::Timestamp(_)));
    }

    #[test]
    fn unconvertible_values_fail() {
        let resolver = TypeResolver::new(HashMap::from([("count".to_string(), DataType::Int64)]));
        let mut flat = record(&[("count", Value::from("many"))]);

        let err = resolver.resolve(&mut flat).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }
}

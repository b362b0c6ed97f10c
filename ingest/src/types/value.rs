use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ErrorKind, IngestResult};

/// A record: field name to value, nested before flattening and flat afterwards.
pub type Record = BTreeMap<String, Value>;

/// Dynamically typed value carried by records.
///
/// JSON numbers are ingested as [`Value::Number`], holding the literal as received, until type
/// resolution turns them into [`Value::Int`] or [`Value::Float`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Number(String),
    String(String),
    Timestamp(DateTime<Utc>),
    Object(Record),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns a short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    /// Converts the value into a [`serde_json::Value`].
    ///
    /// Timestamps become RFC 3339 strings and non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Int(value) => serde_json::Value::from(*value),
            Value::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Number(literal) => literal
                .parse::<serde_json::Number>()
                .map(serde_json::Value::Number)
                .unwrap_or_else(|_| serde_json::Value::String(literal.clone())),
            Value::String(value) => serde_json::Value::String(value.clone()),
            Value::Timestamp(value) => serde_json::Value::String(format_timestamp(value)),
            Value::Object(record) => serde_json::Value::Object(
                record
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Array(values) => {
                serde_json::Value::Array(values.iter().map(Value::to_json).collect())
            }
        }
    }
}

/// Formats a timestamp the way it is rendered everywhere else in the pipeline.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl fmt::Display for Value {
    /// Renders scalars without quoting and nested values as JSON.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Number(literal) => f.write_str(literal),
            Value::String(value) => f.write_str(value),
            Value::Timestamp(value) => f.write_str(&format_timestamp(value)),
            Value::Object(_) | Value::Array(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => Value::Number(number.to_string()),
            serde_json::Value::String(value) => Value::String(value),
            serde_json::Value::Array(values) => {
                Value::Array(values.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Int(value) => serializer.serialize_i64(*value),
            Value::Float(value) if value.is_finite() => serializer.serialize_f64(*value),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Number(literal) => match literal.parse::<serde_json::Number>() {
                Ok(number) => number.serialize(serializer),
                Err(_) => serializer.serialize_str(literal),
            },
            Value::String(value) => serializer.serialize_str(value),
            Value::Timestamp(value) => serializer.serialize_str(&format_timestamp(value)),
            Value::Object(record) => {
                let mut map = serializer.serialize_map(Some(record.len()))?;
                for (key, value) in record {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// Splits a `/`-separated path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Looks up a nested value by path segments.
pub fn get_path<'a, S>(record: &'a Record, segments: &[S]) -> Option<&'a Value>
where
    S: AsRef<str>,
{
    let (last, ancestors) = segments.split_last()?;
    let mut current = record;
    for segment in ancestors {
        current = current.get(segment.as_ref())?.as_object()?;
    }
    current.get(last.as_ref())
}

/// Removes a nested value by path segments, returning it if present.
pub fn remove_path<S>(record: &mut Record, segments: &[S]) -> Option<Value>
where
    S: AsRef<str>,
{
    let (last, ancestors) = segments.split_last()?;
    let mut current = record;
    for segment in ancestors {
        current = match current.get_mut(segment.as_ref()) {
            Some(Value::Object(child)) => child,
            _ => return None,
        };
    }
    current.remove(last.as_ref())
}

/// Writes a nested value by path segments, creating missing intermediate objects.
///
/// Fails with [`ErrorKind::MappingFailed`] when an intermediate value exists but is not an object.
pub fn set_path<S>(record: &mut Record, segments: &[S], value: Value) -> IngestResult<()>
where
    S: AsRef<str>,
{
    let Some((last, ancestors)) = segments.split_last() else {
        return Ok(());
    };

    let mut current = record;
    for (depth, segment) in ancestors.iter().enumerate() {
        let child = current
            .entry(segment.as_ref().to_string())
            .or_insert_with(|| Value::Object(Record::new()));

        current = match child {
            Value::Object(child) => child,
            other => {
                let path: Vec<&str> = segments[..=depth].iter().map(AsRef::as_ref).collect();
                bail!(
                    ErrorKind::MappingFailed,
                    "Path cannot be navigated",
                    format!("`/{}` is a {} and not an object", path.join("/"), other.kind_name())
                )
            }
        };
    }

    current.insert(last.as_ref().to_string(), value);
    Ok(())
}

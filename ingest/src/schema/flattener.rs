use crate::bail;
use crate::error::{ErrorKind, IngestResult};
use crate::schema::column_name::normalize_name;
use crate::types::{Record, Value};

/// Marker contained in keys whose sequence values must not be serialized.
pub const SQL_TYPE_MARKER: &str = "__sql_type";

/// Name given to a field whose flattened key is empty.
pub const UNNAMED_FIELD: &str = "_unnamed";

/// Turns nested records into flat ones.
///
/// Nested keys are joined with `_` and normalized, sequences are stored as JSON strings and null
/// values are dropped unless configured otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flattener {
    store_nulls: bool,
}

impl Flattener {
    pub fn new(store_nulls: bool) -> Self {
        Self { store_nulls }
    }

    /// Flattens a value that must be a mapping.
    pub fn flatten(&self, value: &Value) -> IngestResult<Record> {
        match value {
            Value::Object(record) => Ok(self.flatten_object(record)),
            other => bail!(
                ErrorKind::InvalidData,
                "Only objects can be flattened",
                format!("received a value of kind `{}`", other.kind_name())
            ),
        }
    }

    /// Flattens a record.
    pub fn flatten_object(&self, record: &Record) -> Record {
        let mut flat = Record::new();
        for (key, value) in record {
            self.flatten_into(key, value, &mut flat);
        }

        flat
    }

    fn flatten_into(&self, key: &str, value: &Value, flat: &mut Record) {
        match value {
            Value::Object(children) => {
                for (child_key, child) in children {
                    let joined = if key.is_empty() {
                        child_key.clone()
                    } else {
                        format!("{key}_{child_key}")
                    };
                    self.flatten_into(&joined, child, flat);
                }
            }
            Value::Array(values) if key.contains(SQL_TYPE_MARKER) => {
                flat.insert(key.to_string(), Value::Array(values.clone()));
            }
            Value::Array(_) => {
                flat.insert(
                    flat_key(key),
                    Value::String(value.to_json().to_string()),
                );
            }
            Value::Null if !self.store_nulls => {}
            other => {
                flat.insert(flat_key(key), other.clone());
            }
        }
    }
}

fn flat_key(key: &str) -> String {
    let normalized = normalize_name(key);
    if normalized.is_empty() {
        UNNAMED_FIELD.to_string()
    } else {
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match Value::from(value) {
            Value::Object(record) => record,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn joins_nested_keys() {
        let flat = Flattener::default().flatten_object(&record(json!({
            "User": {"Address": {"City": "Berlin"}, "age": 30},
            "active": true
        })));

        assert_eq!(flat["user_address_city"], Value::from("Berlin"));
        assert_eq!(flat["user_age"], Value::Number("30".to_string()));
        assert_eq!(flat["active"], Value::Bool(true));
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn serializes_sequences_unless_marked() {
        let flat = Flattener::default().flatten_object(&record(json!({
            "tags": ["a", "b"],
            "__sql_type_Amount": ["numeric(10,2)", "numeric(10,2) not null"]
        })));

        assert_eq!(flat["tags"], Value::from(r#"["a","b"]"#));
        assert_eq!(
            flat["__sql_type_Amount"],
            Value::Array(vec![
                Value::from("numeric(10,2)"),
                Value::from("numeric(10,2) not null")
            ])
        );
    }

    #[test]
    fn nulls_are_dropped_unless_stored() {
        let input = record(json!({"a": null, "b": {"c": null}, "d": 1}));

        let flat = Flattener::new(false).flatten_object(&input);
        assert_eq!(flat.keys().collect::<Vec<_>>(), vec!["d"]);

        let flat = Flattener::new(true).flatten_object(&input);
        assert_eq!(flat["a"], Value::Null);
        assert_eq!(flat["b_c"], Value::Null);
    }

    #[test]
    fn empty_keys_are_renamed() {
        let flat = Flattener::default().flatten_object(&record(json!({"": 1})));
        assert_eq!(flat[UNNAMED_FIELD], Value::Number("1".to_string()));
    }

    #[test]
    fn flattening_flat_records_is_identity() {
        let flattener = Flattener::default();
        let once = flattener.flatten_object(&record(json!({
            "a": {"b": 1, "c": [1, 2]},
            "Mixed Case": "x"
        })));
        let twice = flattener.flatten_object(&once);

        assert_eq!(once, twice);
    }

    #[test]
    fn non_object_roots_are_rejected() {
        let err = Flattener::default()
            .flatten(&Value::Array(vec![]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}

use ingest_config::shared::{MappingAction, MappingConfig, MappingRule};

use crate::error::{ErrorKind, IngestResult};
use crate::schema::column_name::normalize_name;
use crate::schema::typing::SQL_TYPE_PREFIX;
use crate::types::{Record, Value, get_path, remove_path, set_path, split_path};
use crate::{bail, ingest_error};

/// Rule with its paths split into segments.
#[derive(Debug, Clone)]
enum CompiledRule {
    Move {
        src: Vec<String>,
        dst: Vec<String>,
        sql_type: Option<String>,
    },
    Remove {
        src: Vec<String>,
    },
    Constant {
        dst: Vec<String>,
        value: Value,
        sql_type: Option<String>,
    },
}

/// Rewrites the structure of records according to an ordered list of rules.
///
/// Deletions requested by `move` and `remove` rules are applied after every rule was evaluated,
/// so a later rule still sees the value an earlier rule moved away.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    rules: Vec<CompiledRule>,
    keep_unmapped: bool,
}

impl FieldMapper {
    /// Compiles the mapping configuration of a destination.
    pub fn new(config: &MappingConfig) -> IngestResult<Self> {
        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| compile(index, rule))
            .collect::<IngestResult<Vec<_>>>()?;

        Ok(Self {
            rules,
            keep_unmapped: config.keep_unmapped,
        })
    }

    /// Returns a mapper that passes records through unchanged.
    pub fn identity() -> Self {
        Self {
            rules: Vec::new(),
            keep_unmapped: true,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rules.is_empty() && self.keep_unmapped
    }

    /// Applies the rules to `record` and returns the mapped record.
    pub fn map(&self, record: &Record) -> IngestResult<Record> {
        if self.is_identity() {
            return Ok(record.clone());
        }

        let mut output = if self.keep_unmapped {
            record.clone()
        } else {
            Record::new()
        };

        let mut deletions: Vec<&[String]> = Vec::new();
        let mut written: Vec<&[String]> = Vec::new();

        for rule in &self.rules {
            match rule {
                CompiledRule::Move { src, dst, sql_type } => {
                    if let Some(value) = get_path(record, src) {
                        set_path(&mut output, dst, value.clone())?;
                        write_sql_type_hint(&mut output, dst, sql_type.as_deref());
                        written.push(dst);
                    }
                    deletions.push(src);
                }
                CompiledRule::Remove { src } => deletions.push(src),
                CompiledRule::Constant {
                    dst,
                    value,
                    sql_type,
                } => {
                    set_path(&mut output, dst, value.clone())?;
                    write_sql_type_hint(&mut output, dst, sql_type.as_deref());
                    written.push(dst);
                }
            }
        }

        for path in deletions {
            if written.contains(&path) {
                continue;
            }
            remove_path(&mut output, path);
        }

        Ok(output)
    }
}

fn compile(index: usize, rule: &MappingRule) -> IngestResult<CompiledRule> {
    let path = |name: &str, value: &Option<String>| -> IngestResult<Vec<String>> {
        let segments = value.as_deref().map(split_path).unwrap_or_default();
        if segments.is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "Invalid mapping rule",
                format!("rule #{index} requires a non-empty `{name}` path")
            );
        }
        Ok(segments)
    };

    let compiled = match rule.action {
        MappingAction::Move => CompiledRule::Move {
            src: path("src", &rule.src)?,
            dst: path("dst", &rule.dst)?,
            sql_type: rule.sql_type.clone(),
        },
        MappingAction::Remove => CompiledRule::Remove {
            src: path("src", &rule.src)?,
        },
        MappingAction::Constant => CompiledRule::Constant {
            dst: path("dst", &rule.dst)?,
            value: rule.value.clone().map(Value::from).ok_or_else(|| {
                ingest_error!(
                    ErrorKind::ConfigError,
                    "Invalid mapping rule",
                    format!("rule #{index} is a `constant` rule without a `value`")
                )
            })?,
            sql_type: rule.sql_type.clone(),
        },
    };

    Ok(compiled)
}

fn write_sql_type_hint(record: &mut Record, dst: &[String], sql_type: Option<&str>) {
    if let Some(sql_type) = sql_type {
        let target = normalize_name(&dst.join("_"));
        record.insert(
            format!("{SQL_TYPE_PREFIX}{target}"),
            Value::String(sql_type.to_string()),
        );
    }
}

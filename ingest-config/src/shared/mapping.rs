use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Action performed by a [`MappingRule`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MappingAction {
    /// Relocates the value at `src` to `dst`.
    Move,
    /// Deletes the value at `src`.
    Remove,
    /// Writes `value` at `dst`.
    Constant,
}

/// One structural rewrite applied to incoming records.
///
/// Paths are `/`-separated, e.g. `/user/address/city`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingRule {
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub dst: Option<String>,
    pub action: MappingAction,
    /// Value written by [`MappingAction::Constant`].
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// SQL type hint attached to the destination column.
    #[serde(default)]
    pub sql_type: Option<String>,
}

/// Field mapping configuration of a destination.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Keeps fields not touched by any rule.
    #[serde(default = "default_keep_unmapped")]
    pub keep_unmapped: bool,
    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

impl MappingConfig {
    /// Checks that every rule carries the paths and value its action requires.
    pub fn validate(&self, destination_id: &str) -> Result<(), ValidationError> {
        for (index, rule) in self.rules.iter().enumerate() {
            let invalid = |reason: &str| ValidationError::InvalidMappingRule {
                destination_id: destination_id.to_string(),
                index,
                reason: reason.to_string(),
            };

            let has_path = |path: &Option<String>| {
                path.as_deref()
                    .is_some_and(|p| !p.trim_matches('/').trim().is_empty())
            };

            match rule.action {
                MappingAction::Move => {
                    if !has_path(&rule.src) || !has_path(&rule.dst) {
                        return Err(invalid("`move` requires both `src` and `dst`"));
                    }
                }
                MappingAction::Remove => {
                    if !has_path(&rule.src) {
                        return Err(invalid("`remove` requires `src`"));
                    }
                }
                MappingAction::Constant => {
                    if !has_path(&rule.dst) {
                        return Err(invalid("`constant` requires `dst`"));
                    }
                    if rule.value.is_none() {
                        return Err(invalid("`constant` requires `value`"));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            keep_unmapped: default_keep_unmapped(),
            rules: Vec::new(),
        }
    }
}

fn default_keep_unmapped() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_without_destination_is_rejected() {
        let config: MappingConfig = serde_json::from_str(
            r#"{"rules": [{"src": "/a", "action": "move"}]}"#,
        )
        .unwrap();

        let err = config.validate("pg").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidMappingRule { index: 0, .. }
        ));
    }

    #[test]
    fn constant_requires_value() {
        let config: MappingConfig = serde_json::from_str(
            r#"{"rules": [{"dst": "/a", "action": "constant"}]}"#,
        )
        .unwrap();

        assert!(config.validate("pg").is_err());
    }

    #[test]
    fn valid_rules_pass() {
        let config: MappingConfig = serde_json::from_str(
            r#"{
                "keep_unmapped": false,
                "rules": [
                    {"src": "/a/b", "dst": "/c", "action": "move", "sql_type": "text"},
                    {"src": "/d", "action": "remove"},
                    {"dst": "/e", "action": "constant", "value": 1}
                ]
            }"#,
        )
        .unwrap();

        assert!(!config.keep_unmapped);
        assert!(config.validate("pg").is_ok());
    }
}

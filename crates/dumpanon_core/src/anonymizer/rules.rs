// anonymizer/rules.rs: configuration types for anonymization
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::hashing::{HashKind, HashTransform};
use super::json::{JsonPath, JsonPaths};
use super::transforms::{Fixed, LineField, NullOut, Quoting, Separated, Substring, Transform};
use crate::classify::ThresholdPolicy;
use crate::error::ConfigError;

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode { Fixed, Null, TextHash, EmailHash, IntHash, Substring, Lines, Json }

#[derive(Deserialize, Clone, Debug)]
pub struct FieldRule {
    pub mode: Mode,
    pub fixed: Option<String>,
    pub len: Option<usize>,
    pub domain: Option<String>,
    pub separator: Option<char>,
    pub marker: Option<String>,
    /// `json` mode: path inside the document -> rule for the leaves it selects
    pub paths: Option<BTreeMap<String, FieldRule>>,
    #[serde(default)]
    pub quoting: Quoting,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TableAction {
    /// Drop every row of the table.
    Truncate,
}

/// A table entry is either an action (`"sessions": "truncate"`) or column rules.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum TableRule {
    Action(TableAction),
    Columns(HashMap<String, FieldRule>),
}

#[derive(Deserialize, Clone, Default)]
pub struct AnonConfig {
    pub version: Option<u32>,
    #[serde(default)]
    pub secret: String,
    pub threshold: Option<usize>,
    #[serde(default)]
    pub tables: HashMap<String, TableRule>,
}

impl AnonConfig {
    pub fn policy(&self) -> Result<ThresholdPolicy, ConfigError> {
        match self.threshold {
            Some(0) => Err(ConfigError::InvalidThreshold),
            Some(t) => Ok(ThresholdPolicy::new(t)),
            None => Ok(ThresholdPolicy::default()),
        }
    }
}

impl FieldRule {
    /// Build the transform this rule describes.
    pub fn build(
        &self,
        table: &str,
        column: &str,
        secret: &str,
        policy: ThresholdPolicy,
    ) -> Result<Arc<dyn Transform>, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            table: table.to_string(),
            column: column.to_string(),
            reason: reason.to_string(),
        };
        if self.len == Some(0) {
            return Err(invalid("len must be at least 1"));
        }
        let base: Arc<dyn Transform> = match self.mode {
            Mode::Fixed => {
                let value = self.fixed.clone().ok_or_else(|| invalid("fixed mode needs 'fixed'"))?;
                Arc::new(Fixed::new(value, self.quoting))
            }
            Mode::Null => Arc::new(NullOut),
            Mode::TextHash => Arc::new(HashTransform::new(secret, HashKind::Text, self.len, policy)),
            Mode::IntHash => Arc::new(HashTransform::new(secret, HashKind::Int, self.len, policy)),
            Mode::EmailHash => {
                let domain = self.domain.clone().ok_or_else(|| invalid("emailhash mode needs 'domain'"))?;
                Arc::new(HashTransform::new(secret, HashKind::Email { domain }, self.len, policy))
            }
            Mode::Substring => Arc::new(Substring::new(self.len.ok_or_else(|| invalid("substring mode needs 'len'"))?)),
            Mode::Lines => {
                let marker = self.marker.clone().ok_or_else(|| invalid("lines mode needs 'marker'"))?;
                Arc::new(LineField::new(marker, self.fixed.clone().unwrap_or_default()))
            }
            Mode::Json => {
                let paths =
                    self.paths.as_ref().filter(|p| !p.is_empty()).ok_or_else(|| invalid("json mode needs 'paths'"))?;
                let mut rules = Vec::with_capacity(paths.len());
                for (path, rule) in paths {
                    let parsed = JsonPath::parse(path).map_err(invalid)?;
                    let label = format!("{}:{}", column, path);
                    rules.push((parsed, rule.build(table, &label, secret, policy)?));
                }
                Arc::new(JsonPaths::new(rules, policy))
            }
        };
        match self.separator {
            None => Ok(base),
            Some(_) if matches!(self.mode, Mode::Null | Mode::Lines | Mode::Json) => {
                Err(invalid("separator cannot be combined with null, lines or json mode"))
            }
            Some(sep) if sep.is_ascii() => Ok(Arc::new(Separated::new(sep as u8, base, policy))),
            Some(_) => Err(invalid("separator must be an ASCII character")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LengthClass;
    use crate::value::Value;

    fn rule(json: &str) -> FieldRule {
        serde_json::from_str(json).expect("rule json")
    }

    #[test]
    fn test_rule_parsing_defaults() {
        let r = rule(r#"{ "mode": "texthash" }"#);
        assert_eq!(r.mode, Mode::TextHash);
        assert_eq!(r.quoting, Quoting::AsInput);
        let r = rule(r#"{ "mode": "fixed", "fixed": "x", "quoting": "unquoted" }"#);
        assert_eq!(r.quoting, Quoting::Unquoted);
    }

    #[test]
    fn test_build_rejects_incomplete_rules() {
        let policy = ThresholdPolicy::default();
        for (json, reason) in [
            (r#"{ "mode": "fixed" }"#, "fixed mode needs 'fixed'"),
            (r#"{ "mode": "emailhash" }"#, "emailhash mode needs 'domain'"),
            (r#"{ "mode": "substring" }"#, "substring mode needs 'len'"),
            (r#"{ "mode": "lines", "fixed": "x" }"#, "lines mode needs 'marker'"),
            (r#"{ "mode": "texthash", "len": 0 }"#, "len must be at least 1"),
            (r#"{ "mode": "texthash", "separator": "é" }"#, "separator must be an ASCII character"),
            (r#"{ "mode": "null", "separator": "," }"#, "separator cannot be combined with null, lines or json mode"),
            (r#"{ "mode": "json" }"#, "json mode needs 'paths'"),
            (r#"{ "mode": "json", "paths": {} }"#, "json mode needs 'paths'"),
            (r#"{ "mode": "json", "paths": { "a b": { "mode": "null" } } }"#, "invalid character in json path"),
            (r#"{ "mode": "json", "paths": { "a": { "mode": "fixed" } } }"#, "fixed mode needs 'fixed'"),
        ] {
            match rule(json).build("t", "c", "s", policy) {
                Err(ConfigError::InvalidRule { reason: got, .. }) => assert_eq!(got, reason, "for {}", json),
                Err(other) => panic!("unexpected error {} for {}", other, json),
                Ok(_) => panic!("expected error for {}", json),
            }
        }
    }

    #[test]
    fn test_build_separated_texthash() {
        let t = rule(r#"{ "mode": "inthash", "separator": "," }"#)
            .build("t", "c", "s", ThresholdPolicy::default())
            .unwrap();
        let out = t.apply(&Value::from("12,345"), LengthClass::Short).unwrap();
        let out = out.as_str().unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(&out[2..3], ",");
        assert!(out.bytes().filter(|&b| b != b',').all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_build_json_paths() {
        let t = rule(
            r#"{ "mode": "json", "paths": {
                "paypal.email": { "mode": "fixed", "fixed": "nobody@example.com" },
                "history[].ip": { "mode": "null" }
            } }"#,
        )
        .build("users", "prefs", "s", ThresholdPolicy::default())
        .unwrap();
        let doc = r#"{"paypal":{"email":"bob@corp.io"},"history":[{"ip":"10.0.0.1"},{"ip":"10.0.0.2"}],"lang":"fr"}"#;
        let out = t.apply(&Value::from(doc), LengthClass::Long).unwrap();
        assert_eq!(
            out.as_str().unwrap(),
            r#"{"paypal":{"email":"nobody@example.com"},"history":[{"ip":null},{"ip":null}],"lang":"fr"}"#
        );
    }

    #[test]
    fn test_nested_rule_errors_name_the_path() {
        let err = rule(r#"{ "mode": "json", "paths": { "a.b": { "mode": "emailhash" } } }"#)
            .build("users", "prefs", "s", ThresholdPolicy::default())
            .err()
            .unwrap();
        match err {
            ConfigError::InvalidRule { column, .. } => assert_eq!(column, "prefs:a.b"),
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_table_rules_parse_truncate_and_columns() {
        let cfg: AnonConfig = serde_json::from_str(
            r#"{ "tables": { "sessions": "truncate", "users": { "name": { "mode": "texthash" } } } }"#,
        )
        .unwrap();
        assert!(matches!(cfg.tables["sessions"], TableRule::Action(TableAction::Truncate)));
        match &cfg.tables["users"] {
            TableRule::Columns(cols) => assert_eq!(cols["name"].mode, Mode::TextHash),
            other => panic!("unexpected table rule {:?}", other),
        }
        assert!(serde_json::from_str::<AnonConfig>(r#"{ "tables": { "t": "drop" } }"#).is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let cfg: AnonConfig = serde_json::from_str(r#"{ "threshold": 0 }"#).unwrap();
        assert!(matches!(cfg.policy(), Err(ConfigError::InvalidThreshold)));
    }
}

// anonymizer/table.rs: column -> transform registry and dispatch
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::rules::{AnonConfig, TableAction, TableRule};
use super::transforms::{Quoting, Transform};
use crate::classify::ThresholdPolicy;
use crate::error::{ConfigError, TransformExecutionError};
use crate::value::{ColumnId, Value};

/// Output of one dispatch: the new value and how to embed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub value: Value,
    pub quoting: Quoting,
}

/// Read-only registry of column transforms plus the threshold policy.
/// Holds no per-row state, so one instance can serve many threads.
/// Cloning shares the transforms.
#[derive(Clone)]
pub struct AnonymizerCore {
    transforms: HashMap<ColumnId, Arc<dyn Transform>>,
    truncated: HashSet<String>,
    policy: ThresholdPolicy,
}

impl AnonymizerCore {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self { transforms: HashMap::new(), truncated: HashSet::new(), policy }
    }

    pub fn from_config(cfg: AnonConfig) -> Result<Self, ConfigError> {
        if let Some(v) = cfg.version {
            if v != 1 {
                return Err(ConfigError::UnsupportedVersion(v));
            }
        }
        let policy = cfg.policy()?;
        let mut core = Self::new(policy);
        for (table, rule) in &cfg.tables {
            match rule {
                TableRule::Action(TableAction::Truncate) => core.truncate_table(table.as_str()),
                TableRule::Columns(fields) => {
                    for (column, rule) in fields {
                        let transform = rule.build(table, column, &cfg.secret, policy)?;
                        core.register(ColumnId::new(table.as_str(), column.as_str()), transform);
                    }
                }
            }
        }
        info!(
            transforms = core.len(),
            truncated = core.truncated.len(),
            threshold = policy.threshold,
            "anonymizer configured"
        );
        Ok(core)
    }

    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    /// Register (or replace) the transform for `column`.
    pub fn register(&mut self, column: ColumnId, transform: Arc<dyn Transform>) -> Option<Arc<dyn Transform>> {
        self.transforms.insert(column, transform)
    }

    /// Drop every row of `table` from statements.
    pub fn truncate_table(&mut self, table: impl Into<String>) {
        self.truncated.insert(table.into());
    }

    pub fn is_truncated(&self, table: &str) -> bool {
        self.truncated.contains(table)
    }

    /// Whether any column of `table` has a transform.
    pub fn has_table(&self, table: &str) -> bool {
        self.transforms.keys().any(|c| c.table == table)
    }

    pub fn resolve(&self, column: &ColumnId) -> Option<&dyn Transform> {
        self.transforms.get(column).map(|t| t.as_ref())
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnId> {
        self.transforms.keys()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Apply the transform registered for `column`.
    ///
    /// Unregistered columns and empty values come back unchanged.
    pub fn apply(&self, column: &ColumnId, value: &Value) -> Result<Applied, TransformExecutionError> {
        match self.resolve(column) {
            Some(transform) => self.apply_with(column, transform, value),
            None => Ok(Applied { value: value.clone(), quoting: Quoting::AsInput }),
        }
    }

    pub(crate) fn apply_with(
        &self,
        column: &ColumnId,
        transform: &dyn Transform,
        value: &Value,
    ) -> Result<Applied, TransformExecutionError> {
        if value.is_empty() {
            return Ok(Applied { value: value.clone(), quoting: Quoting::AsInput });
        }
        let class = self.policy.classify(value);
        let out = transform.apply(value, class).map_err(|reason| TransformExecutionError {
            column: column.clone(),
            input_len: value.len(),
            reason,
        })?;
        Ok(Applied { value: out, quoting: transform.quoting() })
    }
}

impl fmt::Debug for AnonymizerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut columns: Vec<String> = self.transforms.keys().map(|c| c.to_string()).collect();
        columns.sort();
        let mut truncated: Vec<&String> = self.truncated.iter().collect();
        truncated.sort();
        f.debug_struct("AnonymizerCore")
            .field("policy", &self.policy)
            .field("columns", &columns)
            .field("truncated", &truncated)
            .finish()
    }
}

pub fn anonymizer_from_json(json: &str) -> Result<AnonymizerCore, ConfigError> {
    let cfg: AnonConfig = serde_json::from_str(json)?;
    AnonymizerCore::from_config(cfg)
}

pub fn anonymizer_from_path(path: impl AsRef<Path>) -> Result<AnonymizerCore, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
    anonymizer_from_json(&json)
}

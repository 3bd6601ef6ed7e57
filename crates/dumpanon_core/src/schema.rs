// schema.rs: table -> ordered column list, with a reloading cache
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::error::SchemaError;
use crate::value::ColumnId;

#[derive(Deserialize)]
pub struct SchemaRoot {
    #[serde(default)]
    pub tables: HashMap<String, Vec<FieldDef>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum FieldDef { Str(String), Obj { name: String } }

impl FieldDef {
    fn name(&self) -> &str {
        match self {
            FieldDef::Str(s) => s,
            FieldDef::Obj { name } => name,
        }
    }
}

/// Trim and drop backtick quoting: `` `users` `` -> `users`.
pub fn normalize_identifier(name: &str) -> String {
    let s = name.trim();
    let s = s.strip_prefix('`').and_then(|s| s.strip_suffix('`')).unwrap_or(s);
    s.replace("``", "`")
}

pub struct LoadedSchema {
    pub path: String,
    pub mtime: Option<SystemTime>,
    pub table_columns: HashMap<String, Vec<ColumnId>>,
}

impl LoadedSchema {
    /// Build from schema JSON. `path` is recorded for status reporting only.
    pub fn from_json(path: impl Into<String>, json: &str) -> Result<Self, SchemaError> {
        let root: SchemaRoot = serde_json::from_str(json)?;
        let table_columns = root
            .tables
            .into_iter()
            .map(|(table, fields)| {
                let table = normalize_identifier(&table);
                let columns = fields
                    .iter()
                    .map(|f| ColumnId::new(table.as_str(), normalize_identifier(f.name())))
                    .collect();
                (table, columns)
            })
            .collect();
        Ok(Self { path: path.into(), mtime: None, table_columns })
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnId]> {
        self.table_columns.get(table).map(Vec::as_slice)
    }

    pub fn table_count(&self) -> usize {
        self.table_columns.len()
    }
}

pub static SCHEMA_CACHE: Lazy<RwLock<Option<Arc<LoadedSchema>>>> = Lazy::new(|| RwLock::new(None));

/// Current cached schema. The lock is released on return, so a reload never
/// waits for readers still holding an older snapshot.
pub fn cached_schema() -> Option<Arc<LoadedSchema>> {
    SCHEMA_CACHE.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn read_mtime(path: &Path) -> Option<SystemTime> { fs::metadata(path).ok().and_then(|m| m.modified().ok()) }

pub fn load_schema(schema_path: &str) -> Result<LoadedSchema, SchemaError> {
    let data = fs::read_to_string(schema_path)
        .map_err(|source| SchemaError::Io { path: schema_path.to_string(), source })?;
    let mut loaded = LoadedSchema::from_json(schema_path, &data)?;
    loaded.mtime = read_mtime(Path::new(schema_path));
    info!(path = schema_path, tables = loaded.table_count(), "schema loaded");
    Ok(loaded)
}

/// Load `schema_path` into [`SCHEMA_CACHE`] unless the cached copy has the
/// same path and modification time.
pub fn ensure_schema_loaded(schema_path: &str) -> Result<(), SchemaError> {
    let mut guard = SCHEMA_CACHE.write().unwrap_or_else(PoisonError::into_inner);
    let need_reload = match guard.as_ref() {
        None => true,
        Some(ls) => ls.path != schema_path || read_mtime(Path::new(schema_path)) != ls.mtime,
    };
    if need_reload {
        *guard = Some(Arc::new(load_schema(schema_path)?));
    } else {
        debug!(path = schema_path, "schema cache hit");
    }
    Ok(())
}

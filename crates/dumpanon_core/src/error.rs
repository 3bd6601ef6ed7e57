// error.rs: error taxonomy for decoding, transforming and configuring
use thiserror::Error;

use crate::value::ColumnId;

/// A literal whose textual encoding cannot be reversed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedLiteral {
    #[error("empty literal")]
    Empty,
    #[error("truncated escape sequence at byte {offset}")]
    TruncatedEscape { offset: usize },
    #[error("unknown escape sequence 0x{token:02x} at byte {offset}")]
    UnknownEscape { token: u8, offset: usize },
    #[error("unterminated quoted literal")]
    Unterminated,
    #[error("unescaped quote at byte {offset}")]
    UnescapedQuote { offset: usize },
    #[error("invalid hex literal")]
    InvalidHex,
    #[error("invalid unquoted literal")]
    InvalidBareToken,
}

/// A tuple or VALUES list that cannot be split into literals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed row at byte {offset}: {reason}")]
pub struct MalformedRow {
    pub offset: usize,
    pub reason: &'static str,
}

impl MalformedRow {
    pub(crate) fn at(offset: usize, reason: &'static str) -> Self {
        Self { offset, reason }
    }
}

/// Failure reported by a transform. Carries a message only, never the value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transform for {column} failed on a {input_len}-byte value: {reason}")]
pub struct TransformExecutionError {
    pub column: ColumnId,
    pub input_len: usize,
    pub reason: TransformError,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowTransformError {
    #[error(transparent)]
    Malformed(#[from] MalformedRow),
    #[error("column {position} ({column}): {source}")]
    MalformedLiteral {
        position: usize,
        column: String,
        #[source]
        source: MalformedLiteral,
    },
    #[error("column {position}: {source}")]
    Transform {
        position: usize,
        #[source]
        source: TransformExecutionError,
    },
}

impl RowTransformError {
    /// Position of the failing column, when the failure is tied to one.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Malformed(_) => None,
            Self::MalformedLiteral { position, .. } | Self::Transform { position, .. } => Some(*position),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatementError {
    #[error(transparent)]
    Malformed(#[from] MalformedRow),
    #[error("row {index}: {source}")]
    Row {
        index: usize,
        #[source]
        source: RowTransformError,
    },
    #[error("table {table} has transforms but no known columns")]
    UnknownColumns { table: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid anonymizer config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported anonymizer config version: {0}")]
    UnsupportedVersion(u32),
    #[error("threshold must be at least 1")]
    InvalidThreshold,
    #[error("rule {table}.{column}: {reason}")]
    InvalidRule {
        table: String,
        column: String,
        reason: String,
    },
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse schema JSON: {0}")]
    Json(#[from] serde_json::Error),
}

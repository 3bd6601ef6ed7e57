// row.rs: decode -> classify -> apply -> encode over whole tuples and statements
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::anonymizer::{AnonymizerCore, Quoting};
use crate::error::{MalformedRow, RowTransformError, StatementError};
use crate::literal::{decode, encode_into, LiteralKind};
use crate::schema::LoadedSchema;
use crate::tokenizer::{is_insert_statement, split_tuple, split_values, statement_table};
use crate::value::ColumnId;

/// Table an INSERT/REPLACE line writes to; `None` for any other line.
fn insert_target(line: &[u8]) -> Result<Option<&str>, StatementError> {
    if !is_insert_statement(line) {
        return Ok(None);
    }
    match statement_table(line) {
        Some(table) => Ok(Some(table)),
        None => Err(MalformedRow::at(0, "cannot determine table name").into()),
    }
}

fn output_kind(input: LiteralKind, quoting: Quoting) -> LiteralKind {
    match quoting {
        Quoting::AsInput => input,
        Quoting::Quoted if input == LiteralKind::Binary => LiteralKind::Binary,
        Quoting::Quoted => LiteralKind::Quoted,
        Quoting::Unquoted => LiteralKind::Bare,
        Quoting::Null => LiteralKind::Null,
    }
}

impl AnonymizerCore {
    /// Transform one tuple `( lit , lit , ... )`.
    ///
    /// `columns` names the literals in positional order. Every literal is decoded;
    /// NULLs and columns without a transform are copied byte for byte, as is
    /// everything between literals. The first failure aborts the whole row.
    pub fn transform_row(&self, row: &[u8], columns: &[ColumnId]) -> Result<Vec<u8>, RowTransformError> {
        let literals = split_tuple(row)?;
        if literals.len() != columns.len() {
            debug!(literals = literals.len(), columns = columns.len(), "column count mismatch");
        }
        let mut out = Vec::with_capacity(row.len() + 16);
        let mut copied = 0usize;
        for (position, span) in literals.into_iter().enumerate() {
            let column = columns.get(position);
            let decoded = decode(&row[span.clone()]).map_err(|source| RowTransformError::MalformedLiteral {
                position,
                column: column.map_or_else(|| format!("#{}", position), |c| c.to_string()),
                source,
            })?;
            let Some((column, transform)) = column.and_then(|c| self.resolve(c).map(|t| (c, t))) else {
                continue;
            };
            if decoded.kind == LiteralKind::Null {
                continue;
            }
            let applied = self
                .apply_with(column, transform, &decoded.value)
                .map_err(|source| RowTransformError::Transform { position, source })?;
            out.extend_from_slice(&row[copied..span.start]);
            encode_into(output_kind(decoded.kind, applied.quoting), applied.value.as_bytes(), &mut out);
            copied = span.end;
        }
        out.extend_from_slice(&row[copied..]);
        Ok(out)
    }

    /// Transform a batch of rows in parallel. Results keep the input order.
    pub fn transform_rows<R>(&self, rows: &[R], columns: &[ColumnId]) -> Vec<Result<Vec<u8>, RowTransformError>>
    where
        R: AsRef<[u8]> + Sync,
    {
        rows.par_iter().map(|row| self.transform_row(row.as_ref(), columns)).collect()
    }

    /// Transform every tuple of an `INSERT ... VALUES (..),(..);` line.
    ///
    /// Lines that are not INSERT/REPLACE statements are returned unchanged; an
    /// INSERT whose VALUES list cannot be found is malformed. Statements on a
    /// truncated table come back empty.
    pub fn transform_statement(&self, line: &[u8], columns: &[ColumnId]) -> Result<Vec<u8>, StatementError> {
        let Some(list) = split_values(line)? else {
            return Ok(line.to_vec());
        };
        if let Some(table) = statement_table(line).filter(|t| self.is_truncated(t)) {
            debug!(table, "statement dropped");
            return Ok(Vec::new());
        }
        let rows: Vec<Result<Vec<u8>, RowTransformError>> =
            list.tuples.par_iter().map(|r| self.transform_row(&line[r.clone()], columns)).collect();

        let mut out = Vec::with_capacity(line.len());
        let mut copied = 0usize;
        for (index, (range, row)) in list.tuples.iter().zip(rows).enumerate() {
            let row = row.map_err(|source| {
                warn!(row = index, error = %source, "row rejected");
                StatementError::Row { index, source }
            })?;
            out.extend_from_slice(&line[copied..range.start]);
            out.extend_from_slice(&row);
            copied = range.end;
        }
        out.extend_from_slice(&line[copied..]);
        Ok(out)
    }

    /// Like [`transform_statement`](Self::transform_statement), with the columns
    /// taken from `schema` by table name.
    ///
    /// A table missing from the schema passes through unless it has transforms,
    /// which is an error rather than a silent leak.
    pub fn transform_statement_with_schema(
        &self,
        line: &[u8],
        schema: &LoadedSchema,
    ) -> Result<Vec<u8>, StatementError> {
        let Some(table) = insert_target(line)? else {
            return Ok(line.to_vec());
        };
        if self.is_truncated(table) {
            debug!(table, "statement dropped");
            return Ok(Vec::new());
        }
        match schema.columns(table) {
            Some(columns) => self.transform_statement(line, columns),
            None if self.has_table(table) => Err(StatementError::UnknownColumns { table: table.to_string() }),
            None => {
                debug!(table, "table not in schema, passed through");
                Ok(line.to_vec())
            }
        }
    }

    /// Like [`transform_statement`](Self::transform_statement), with the table
    /// read from the line and the columns given by name.
    pub fn transform_statement_named<S: AsRef<str>>(
        &self,
        line: &[u8],
        names: &[S],
    ) -> Result<Vec<u8>, StatementError> {
        let Some(table) = insert_target(line)? else {
            return Ok(line.to_vec());
        };
        let columns: Vec<ColumnId> = names.iter().map(|n| ColumnId::new(table, n.as_ref())).collect();
        self.transform_statement(line, &columns)
    }
}

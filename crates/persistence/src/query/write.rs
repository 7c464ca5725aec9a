//! Write statement builders.
//!
//! Bulk writes bind `:<column>_token_<row>`; single-entity writes bind
//! `:<column>_token_<position>` and `:id`.

use std::fmt;

use serde_json::Value;

use crate::dialect::{Dialect, Returning};
use crate::error::{RequestError, StorageResult};
use crate::types::row::{Row, same_columns};
use crate::types::TableDescriptor;

use super::filter::bind_safe;
use super::params::{BoundParams, SqlParam};
use super::statement::BoundStatement;

/// Placeholder of the primary key in single-entity statements.
pub const ID_PLACEHOLDER: &str = ":id";

/// Kind of bulk write being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// `INSERT`
    Insert,
    /// `DELETE`
    Delete,
}

impl WriteMode {
    /// Builds the statement for one batch of rows.
    pub fn build(
        self,
        dialect: &dyn Dialect,
        table: &str,
        rows: &[Row],
    ) -> StorageResult<BoundStatement> {
        match self {
            WriteMode::Insert => build_insert(dialect, table, rows),
            WriteMode::Delete => build_delete(dialect, table, rows),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Insert => write!(f, "insert"),
            WriteMode::Delete => write!(f, "delete"),
        }
    }
}

/// Column values as parameters. Arrays and objects are bound as JSON text.
pub fn value_param(value: &Value) -> SqlParam {
    SqlParam::from_json(value).unwrap_or_else(|| SqlParam::Text(value.to_string()))
}

fn token(column: &str, index: usize) -> String {
    format!(":{}_token_{}", bind_safe(column), index)
}

/// Checks that `rows` is non-degenerate and that every row carries the first
/// row's columns in the same order. Returns the column names.
pub fn check_rows(rows: &[Row]) -> StorageResult<Vec<String>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    if first.is_empty() {
        return Err(RequestError::EmptyRow { index: 0 }.into());
    }
    if let Some(index) = rows.iter().position(|row| !same_columns(first, row)) {
        return Err(RequestError::InconsistentColumns { index }.into());
    }
    Ok(first.keys().cloned().collect())
}

fn insert_statement(
    dialect: &dyn Dialect,
    table: &str,
    columns: &[String],
    tuples: Vec<String>,
    params: BoundParams,
) -> BoundStatement {
    let column_list = columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) ",
        dialect.quote_identifier(table),
        column_list
    );
    let returning = dialect.returning();
    if let Returning::Output(clause) = returning {
        sql.push_str(clause);
        sql.push(' ');
    }
    sql.push_str("VALUES ");
    sql.push_str(&tuples.join(", "));
    if let Returning::Trailing(clause) = returning {
        sql.push(' ');
        sql.push_str(clause);
    }
    BoundStatement::new(sql, params)
}

/// `INSERT` of several rows, returning the inserted rows.
pub fn build_insert(
    dialect: &dyn Dialect,
    table: &str,
    rows: &[Row],
) -> StorageResult<BoundStatement> {
    let columns = check_rows(rows)?;
    if columns.is_empty() {
        return Err(RequestError::EmptyRow { index: 0 }.into());
    }

    let mut params = BoundParams::with_capacity(rows.len() * columns.len());
    let mut tuples = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let mut names = Vec::with_capacity(columns.len());
        for (column, value) in row {
            let name = token(column, index);
            params.bind(name.clone(), value_param(value))?;
            names.push(name);
        }
        tuples.push(format!("({})", names.join(", ")));
    }

    Ok(insert_statement(dialect, table, &columns, tuples, params))
}

/// `DELETE` of the rows matching any of `rows` on every column.
///
/// Null values match with `IS NULL` and bind nothing.
pub fn build_delete(
    dialect: &dyn Dialect,
    table: &str,
    rows: &[Row],
) -> StorageResult<BoundStatement> {
    let columns = check_rows(rows)?;
    if columns.is_empty() {
        return Err(RequestError::EmptyRow { index: 0 }.into());
    }

    let mut params = BoundParams::with_capacity(rows.len() * columns.len());
    let mut groups = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let mut conditions = Vec::with_capacity(columns.len());
        for (column, value) in row {
            let quoted = dialect.quote_identifier(column);
            if value.is_null() {
                conditions.push(format!("{} IS NULL", quoted));
                continue;
            }
            let name = token(column, index);
            conditions.push(format!("{} = {}", quoted, name));
            params.bind(name, value_param(value))?;
        }
        groups.push(format!("({})", conditions.join(" AND ")));
    }

    let sql = format!(
        "DELETE FROM {} WHERE {}",
        dialect.quote_identifier(table),
        groups.join(" OR ")
    );
    Ok(BoundStatement::new(sql, params))
}

/// `INSERT` of a single entity.
pub fn build_entity_insert(
    dialect: &dyn Dialect,
    descriptor: &TableDescriptor,
    values: &[(String, SqlParam)],
) -> StorageResult<BoundStatement> {
    if values.is_empty() {
        return Err(RequestError::EmptyRow { index: 0 }.into());
    }
    let mut params = BoundParams::with_capacity(values.len());
    let mut names = Vec::with_capacity(values.len());
    for (position, (column, value)) in values.iter().enumerate() {
        let name = token(column, position);
        params.bind(name.clone(), value.clone())?;
        names.push(name);
    }
    let columns: Vec<String> = values.iter().map(|(c, _)| c.clone()).collect();
    let tuple = format!("({})", names.join(", "));
    Ok(insert_statement(
        dialect,
        descriptor.table(),
        &columns,
        vec![tuple],
        params,
    ))
}

/// `UPDATE` of a single entity by primary key.
pub fn build_entity_update(
    dialect: &dyn Dialect,
    descriptor: &TableDescriptor,
    values: &[(String, SqlParam)],
    id: SqlParam,
) -> StorageResult<BoundStatement> {
    if values.is_empty() {
        return Err(RequestError::EmptyRow { index: 0 }.into());
    }
    let mut params = BoundParams::with_capacity(values.len() + 1);
    let mut assignments = Vec::with_capacity(values.len());
    for (position, (column, value)) in values.iter().enumerate() {
        let name = token(column, position);
        assignments.push(format!("{} = {}", dialect.quote_identifier(column), name));
        params.bind(name, value.clone())?;
    }
    params.bind(ID_PLACEHOLDER, id)?;

    let mut sql = format!(
        "UPDATE {} SET {} ",
        dialect.quote_identifier(descriptor.table()),
        assignments.join(", ")
    );
    let returning = dialect.returning();
    if let Returning::Output(clause) = returning {
        sql.push_str(clause);
        sql.push(' ');
    }
    sql.push_str(&format!(
        "WHERE {} = {}",
        dialect.quote_identifier(descriptor.id_column()),
        ID_PLACEHOLDER
    ));
    if let Returning::Trailing(clause) = returning {
        sql.push(' ');
        sql.push_str(clause);
    }
    Ok(BoundStatement::new(sql, params))
}

/// `SELECT *` of a single entity by primary key.
pub fn build_select_by_id(
    dialect: &dyn Dialect,
    descriptor: &TableDescriptor,
    id: SqlParam,
) -> StorageResult<BoundStatement> {
    let mut params = BoundParams::with_capacity(1);
    params.bind(ID_PLACEHOLDER, id)?;
    let sql = format!(
        "SELECT * FROM {} WHERE {} = {}",
        dialect.quote_identifier(descriptor.table()),
        dialect.quote_identifier(descriptor.id_column()),
        ID_PLACEHOLDER
    );
    Ok(BoundStatement::new(sql, params))
}

/// `DELETE` of a single entity by primary key.
pub fn build_delete_by_id(
    dialect: &dyn Dialect,
    descriptor: &TableDescriptor,
    id: SqlParam,
) -> StorageResult<BoundStatement> {
    let mut params = BoundParams::with_capacity(1);
    params.bind(ID_PLACEHOLDER, id)?;
    let sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        dialect.quote_identifier(descriptor.table()),
        dialect.quote_identifier(descriptor.id_column()),
        ID_PLACEHOLDER
    );
    Ok(BoundStatement::new(sql, params))
}

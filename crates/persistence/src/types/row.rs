//! Result rows.

use serde_json::{Map, Value};

/// A fetched or to-be-written row: column name to JSON value.
pub type Row = Map<String, Value>;

/// Column names of `row` in order.
pub fn columns(row: &Row) -> Vec<&str> {
    row.keys().map(String::as_str).collect()
}

/// Whether two rows carry exactly the same column names in the same order.
pub fn same_columns(a: &Row, b: &Row) -> bool {
    a.len() == b.len() && a.keys().zip(b.keys()).all(|(x, y)| x == y)
}

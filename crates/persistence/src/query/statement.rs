//! Statements ready for execution.

use std::fmt;

use super::cache::StatementKey;
use super::params::BoundParams;

/// SQL text with `:name` placeholders, its bound values and its cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    sql: String,
    params: BoundParams,
    key: StatementKey,
}

impl BoundStatement {
    /// Creates a statement and derives its cache key.
    pub fn new(sql: impl Into<String>, params: BoundParams) -> Self {
        let sql = sql.into();
        let key = StatementKey::for_sql(&sql);
        Self { sql, params, key }
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound values.
    pub fn params(&self) -> &BoundParams {
        &self.params
    }

    /// Cache key of the SQL text.
    pub fn key(&self) -> &StatementKey {
        &self.key
    }
}

impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

//! SQL dialects.
//!
//! A [`Dialect`] supplies the syntax fragments that differ between engines.
//! Clause sequencing lives in [`SelectBuilder`](crate::query::SelectBuilder)
//! and the write builders, which call into the dialect only for the pieces
//! below.
//!
//! | Dialect | Parameter limit | Subset | Lock | Returning |
//! |---------|-----------------|--------|------|-----------|
//! | PostgreSQL | 65535 | `LIMIT n OFFSET m` | `FOR UPDATE` | `RETURNING *` |
//! | SQL Server | 2100 | `OFFSET m ROWS FETCH NEXT n ROWS ONLY` | `WITH (UPDLOCK, ROWLOCK)` | `OUTPUT inserted.*` |
//! | SQLite | 32766 | `LIMIT n OFFSET m` | unsupported | `RETURNING *` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, RequestError, StorageResult};
use crate::query::{ParamLimit, QueryRequest, Subset};

pub mod postgres;
pub mod sqlite;
pub mod sqlserver;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

/// Identifies a SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// PostgreSQL.
    #[serde(alias = "pgsql", alias = "postgresql")]
    Postgres,
    /// Microsoft SQL Server.
    #[serde(alias = "mssql")]
    SqlServer,
    /// SQLite.
    Sqlite,
}

impl DialectKind {
    /// The dialect implementation.
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Postgres => &PostgresDialect,
            DialectKind::SqlServer => &SqlServerDialect,
            DialectKind::Sqlite => &SqliteDialect,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::Postgres => write!(f, "postgres"),
            DialectKind::SqlServer => write!(f, "sqlserver"),
            DialectKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(DialectKind::Postgres),
            "sqlserver" | "mssql" => Ok(DialectKind::SqlServer),
            "sqlite" => Ok(DialectKind::Sqlite),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}

/// Where a row lock is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSyntax {
    /// Table hint placed right after the table name in `FROM`.
    TableHint(&'static str),
    /// Clause appended at the very end of the statement.
    Trailing(&'static str),
}

/// How a write statement returns the affected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returning {
    /// Clause appended after the statement (`RETURNING *`).
    Trailing(&'static str),
    /// Clause placed before `VALUES`/`WHERE` (`OUTPUT inserted.*`).
    Output(&'static str),
}

/// Table lock modes understood by `LOCK TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TableLockMode {
    /// `ACCESS SHARE`, taken by plain reads.
    AccessShare,
    /// `ROW SHARE`
    RowShare,
    /// `ROW EXCLUSIVE`, taken by writes.
    RowExclusive,
    /// `SHARE UPDATE EXCLUSIVE`
    ShareUpdateExclusive,
    /// `SHARE`, blocks writes.
    Share,
    /// `SHARE ROW EXCLUSIVE`
    ShareRowExclusive,
    /// `EXCLUSIVE`, allows only concurrent reads.
    Exclusive,
    /// `ACCESS EXCLUSIVE`, blocks everything.
    #[default]
    AccessExclusive,
}

impl TableLockMode {
    /// SQL spelling.
    pub fn as_sql(&self) -> &'static str {
        match self {
            TableLockMode::AccessShare => "ACCESS SHARE",
            TableLockMode::RowShare => "ROW SHARE",
            TableLockMode::RowExclusive => "ROW EXCLUSIVE",
            TableLockMode::ShareUpdateExclusive => "SHARE UPDATE EXCLUSIVE",
            TableLockMode::Share => "SHARE",
            TableLockMode::ShareRowExclusive => "SHARE ROW EXCLUSIVE",
            TableLockMode::Exclusive => "EXCLUSIVE",
            TableLockMode::AccessExclusive => "ACCESS EXCLUSIVE",
        }
    }
}

/// Engine-specific syntax used by the statement builders.
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Which dialect this is.
    fn kind(&self) -> DialectKind;

    /// Quotes an identifier, doubling embedded quotes.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Function used by case-insensitive filters.
    fn case_fold_function(&self) -> &'static str {
        "LOWER"
    }

    /// Default bound-parameter ceiling.
    fn default_param_limit(&self) -> ParamLimit {
        ParamLimit::for_dialect(self.kind())
    }

    /// Text placed before `SELECT`. Empty unless a dialect needs a preamble.
    fn prepend(&self, _request: &QueryRequest) -> String {
        String::new()
    }

    /// Limit/offset clause, including its trailing space.
    ///
    /// `sorted` tells whether an `ORDER BY` clause precedes it.
    fn subset_clause(&self, subset: Subset, sorted: bool) -> String;

    /// Row lock syntax.
    fn lock_syntax(&self) -> StorageResult<LockSyntax>;

    /// Returning syntax of `INSERT` and `UPDATE`.
    fn returning(&self) -> Returning;

    /// Full `LOCK TABLE` statement.
    fn lock_table_statement(&self, _table: &str, _mode: TableLockMode) -> StorageResult<String> {
        Err(BackendError::UnsupportedCapability {
            backend_name: self.kind().to_string(),
            capability: "table locks".to_string(),
        }
        .into())
    }
}

pub(crate) fn unsupported_directive(kind: DialectKind, directive: &str) -> RequestError {
    RequestError::UnsupportedDirective {
        dialect: kind.to_string(),
        directive: directive.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_kind_round_trip() {
        for kind in [DialectKind::Postgres, DialectKind::SqlServer, DialectKind::Sqlite] {
            assert_eq!(kind.to_string().parse::<DialectKind>().unwrap(), kind);
            assert_eq!(kind.dialect().kind(), kind);
        }
        assert_eq!("mssql".parse::<DialectKind>().unwrap(), DialectKind::SqlServer);
        assert!("oracle".parse::<DialectKind>().is_err());
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        let d = DialectKind::Postgres.dialect();
        assert_eq!(d.quote_identifier("name"), "\"name\"");
        assert_eq!(d.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_default_lock_table_is_unsupported() {
        let d = DialectKind::SqlServer.dialect();
        assert!(d.lock_table_statement("t", TableLockMode::default()).is_err());
    }
}

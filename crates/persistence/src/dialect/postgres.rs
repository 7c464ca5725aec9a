//! PostgreSQL syntax.

use crate::error::StorageResult;
use crate::query::Subset;

use super::{Dialect, DialectKind, LockSyntax, Returning, TableLockMode};

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn subset_clause(&self, subset: Subset, _sorted: bool) -> String {
        format!("LIMIT {} OFFSET {} ", subset.limit(), subset.offset())
    }

    fn lock_syntax(&self) -> StorageResult<LockSyntax> {
        Ok(LockSyntax::Trailing("FOR UPDATE "))
    }

    fn returning(&self) -> Returning {
        Returning::Trailing("RETURNING *")
    }

    fn lock_table_statement(&self, table: &str, mode: TableLockMode) -> StorageResult<String> {
        Ok(format!(
            "LOCK {} IN {} MODE",
            self.quote_identifier(table),
            mode.as_sql()
        ))
    }
}

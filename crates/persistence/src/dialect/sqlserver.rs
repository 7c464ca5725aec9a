//! SQL Server syntax.
//!
//! Paging uses `OFFSET .. FETCH`, which SQL Server only accepts after an
//! `ORDER BY`; unsorted requests get `ORDER BY (SELECT NULL)`. Row locks are
//! table hints on the `FROM` clause rather than a trailing clause.

use crate::error::StorageResult;
use crate::query::Subset;

use super::{Dialect, DialectKind, LockSyntax, Returning};

/// SQL Server dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn subset_clause(&self, subset: Subset, sorted: bool) -> String {
        let order = if sorted { "" } else { "ORDER BY (SELECT NULL) " };
        format!(
            "{}OFFSET {} ROWS FETCH NEXT {} ROWS ONLY ",
            order,
            subset.offset(),
            subset.limit()
        )
    }

    fn lock_syntax(&self) -> StorageResult<LockSyntax> {
        Ok(LockSyntax::TableHint("WITH (UPDLOCK, ROWLOCK)"))
    }

    fn returning(&self) -> Returning {
        Returning::Output("OUTPUT inserted.*")
    }
}

//! SQLite syntax.

use crate::error::StorageResult;
use crate::query::Subset;

use super::{Dialect, DialectKind, LockSyntax, Returning, unsupported_directive};

/// SQLite dialect. Row locks do not exist in SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn subset_clause(&self, subset: Subset, _sorted: bool) -> String {
        format!("LIMIT {} OFFSET {} ", subset.limit(), subset.offset())
    }

    fn lock_syntax(&self) -> StorageResult<LockSyntax> {
        Err(unsupported_directive(self.kind(), "__lock").into())
    }

    fn returning(&self) -> Returning {
        Returning::Trailing("RETURNING *")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RequestError, StorageError};

    #[test]
    fn test_lock_is_rejected() {
        assert!(matches!(
            SqliteDialect.lock_syntax(),
            Err(StorageError::Request(RequestError::UnsupportedDirective { .. }))
        ));
    }
}

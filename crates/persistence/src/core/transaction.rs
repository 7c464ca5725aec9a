//! Transaction helpers shared by collections and models.
//!
//! These wrap the raw [`Connection`] transaction calls with the lazy-connect
//! and idempotency rules callers expect:
//!
//! - [`is_in_transaction`] and [`begin_transaction`] connect first when needed
//! - [`begin_transaction`] is a no-op inside an open transaction
//! - [`commit_transaction`] is a no-op outside a transaction
//!
//! Lock directives on `SELECT` and [`lock_table`] both require a transaction
//! opened through these helpers (or directly on the connection).

use crate::dialect::TableLockMode;
use crate::error::{PreconditionError, StorageResult};
use crate::query::{BoundParams, BoundStatement};

use super::connection::Connection;

/// Whether `conn` has an open transaction, connecting first if needed.
pub async fn is_in_transaction(conn: &dyn Connection) -> StorageResult<bool> {
    if !conn.is_connected() {
        conn.connect().await?;
    }
    Ok(conn.in_transaction())
}

/// Opens a transaction unless one is already open, connecting first if needed.
pub async fn begin_transaction(conn: &dyn Connection) -> StorageResult<()> {
    if !conn.is_connected() {
        conn.connect().await?;
    }
    if !conn.in_transaction() {
        conn.begin().await?;
    }
    Ok(())
}

/// Commits the open transaction, if any.
pub async fn commit_transaction(conn: &dyn Connection) -> StorageResult<()> {
    if conn.in_transaction() {
        conn.commit().await?;
    }
    Ok(())
}

/// Rolls back the open transaction.
pub async fn rollback_transaction(conn: &dyn Connection) -> StorageResult<()> {
    conn.rollback().await
}

/// Takes a table-level lock inside the open transaction.
///
/// Only PostgreSQL supports `LOCK TABLE`; other dialects report an
/// unsupported capability.
pub async fn lock_table(
    conn: &dyn Connection,
    table: &str,
    mode: TableLockMode,
) -> StorageResult<()> {
    if !conn.is_connected() {
        return Err(PreconditionError::NotConnected.into());
    }
    if !conn.in_transaction() {
        return Err(PreconditionError::LockOutsideTransaction {
            table: table.to_string(),
        }
        .into());
    }
    let sql = conn.dialect().lock_table_statement(table, mode)?;
    tracing::debug!(table, mode = mode.as_sql(), "locking table");
    conn.execute(&BoundStatement::new(sql, BoundParams::new()))
        .await?;
    Ok(())
}

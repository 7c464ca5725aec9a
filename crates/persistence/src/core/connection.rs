//! Database connection abstraction.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::dialect::{Dialect, DialectKind};
use crate::error::StorageResult;
use crate::query::{BoundStatement, CacheStats, ParamLimit};
use crate::types::Row;

/// A connection to one database shard.
///
/// Statements carry `:name` placeholders; adapters translate them into their
/// native form. Implementations keep their own state behind interior locks so
/// a connection can be shared through an `Arc`, but callers issue statements on
/// a connection one at a time.
///
/// # Example
///
/// ```ignore
/// use tessera_persistence::core::Connection;
/// use tessera_persistence::query::{QueryRequest, SelectBuilder};
///
/// async fn count_active(conn: &dyn Connection, descriptor: &TableDescriptor) -> StorageResult<usize> {
///     let request = QueryRequest::new().filter("status", ["active"]);
///     let statement = SelectBuilder::new(conn.dialect(), descriptor)
///         .build(&request, conn.in_transaction())?;
///     Ok(conn.fetch_all(&statement).await?.len())
/// }
/// ```
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Dialect spoken by this connection.
    fn kind(&self) -> DialectKind;

    /// Dialect implementation.
    fn dialect(&self) -> &'static dyn Dialect {
        self.kind().dialect()
    }

    /// Human-readable backend name used in errors.
    fn name(&self) -> &'static str;

    /// Whether the connection is established.
    fn is_connected(&self) -> bool;

    /// Establishes the connection. Does nothing when already connected.
    async fn connect(&self) -> StorageResult<()>;

    /// Closes the connection and clears the statement cache.
    ///
    /// An open transaction is rolled back by the server.
    async fn disconnect(&self) -> StorageResult<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Opens a transaction.
    async fn begin(&self) -> StorageResult<()>;

    /// Commits the open transaction.
    async fn commit(&self) -> StorageResult<()>;

    /// Rolls back the open transaction.
    async fn rollback(&self) -> StorageResult<()>;

    /// Prepares (through the statement cache), binds and runs a statement,
    /// returning every row.
    async fn fetch_all(&self, statement: &BoundStatement) -> StorageResult<Vec<Row>>;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, statement: &BoundStatement) -> StorageResult<u64>;

    /// Bound-parameter ceiling of this connection.
    fn param_limit(&self) -> ParamLimit {
        self.kind().dialect().default_param_limit()
    }

    /// Statement cache counters.
    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

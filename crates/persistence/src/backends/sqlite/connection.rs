//! SQLite shard connection.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::ToSql;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use serde_json::{Map, Value};

use crate::core::Connection;
use crate::dialect::DialectKind;
use crate::error::{BackendError, PreconditionError, StorageError, StorageResult};
use crate::query::{BoundStatement, CacheStats, ParamLimit, SqlParam, StatementCache};
use crate::types::Row;

use super::config::SqliteConfig;

type Pooled = PooledConnection<SqliteConnectionManager>;

/// A connection to one SQLite database.
///
/// SQLite understands `:name` placeholders natively, so statements are
/// prepared as built. One pooled connection is held from
/// [`connect`](Connection::connect) until [`disconnect`](Connection::disconnect);
/// in-memory databases use a pool of one so reconnecting sees the same data.
///
/// Statements are cached by [`StatementKey`](crate::query::StatementKey):
/// the first SQL text seen for a key is the one handed to rusqlite's
/// `prepare_cached`, so texts differing only in whitespace share one prepared
/// statement.
pub struct SqliteConnection {
    config: SqliteConfig,
    pool: Pool<SqliteConnectionManager>,
    conn: Mutex<Option<Pooled>>,
    statements: Mutex<StatementCache<String>>,
    param_limit: ParamLimit,
}

impl Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.config.path)
            .field("connected", &self.is_connected())
            .field("param_limit", &self.param_limit)
            .finish_non_exhaustive()
    }
}

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

fn to_sqlite_value(param: &SqlParam) -> SqliteValue {
    match param {
        SqlParam::Text(s) => SqliteValue::Text(s.clone()),
        SqlParam::Float(f) => SqliteValue::Real(*f),
        SqlParam::Integer(i) => SqliteValue::Integer(*i),
        SqlParam::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        SqlParam::Timestamp(t) => SqliteValue::Text(t.to_rfc3339()),
        SqlParam::Null => SqliteValue::Null,
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

impl SqliteConnection {
    /// Creates an unconnected connection. The pool opens database handles
    /// lazily.
    pub fn new(config: SqliteConfig) -> StorageResult<Self> {
        let manager = if config.is_memory() {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(&config.path)
        };
        let max_size = if config.is_memory() {
            1
        } else {
            config.max_connections.max(1)
        };

        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(config.min_connections.min(max_size)))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build_unchecked(manager);

        Ok(Self {
            statements: Mutex::new(StatementCache::new(config.statement_cache_capacity)),
            config,
            pool,
            conn: Mutex::new(None),
            param_limit: ParamLimit::for_dialect(DialectKind::Sqlite),
        })
    }

    /// Creates an in-memory database connection.
    pub fn in_memory() -> StorageResult<Self> {
        Self::new(SqliteConfig::in_memory())
    }

    /// Overrides the bound-parameter ceiling.
    pub fn with_param_limit(mut self, limit: ParamLimit) -> Self {
        self.param_limit = limit;
        self
    }

    /// Connection settings.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Runs a batch of semicolon-separated statements without parameters,
    /// for schema setup.
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))
    }

    fn configure(&self, conn: &Pooled) -> StorageResult<()> {
        conn.busy_timeout(Duration::from_millis(u64::from(self.config.busy_timeout_ms)))
            .map_err(|e| internal_error(format!("Failed to set busy timeout: {}", e)))?;
        conn.set_prepared_statement_cache_capacity(self.config.statement_cache_capacity);

        if self.config.enable_foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON")
                .map_err(|e| internal_error(format!("Failed to enable foreign keys: {}", e)))?;
        }
        Ok(())
    }

    fn with_conn<R>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(PreconditionError::NotConnected)?;
        f(conn)
    }

    // SQL text to prepare for `statement`.
    fn cached_sql(&self, statement: &BoundStatement) -> String {
        let mut statements = self.statements.lock();
        if let Some(sql) = statements.get(statement.key()) {
            return sql.clone();
        }
        statements.insert(statement.key().clone(), statement.sql().to_string());
        statement.sql().to_string()
    }

    fn query_rows(
        conn: &rusqlite::Connection,
        sql: &str,
        statement: &BoundStatement,
    ) -> StorageResult<Vec<Row>> {
        let mut prepared = conn.prepare_cached(sql)?;
        let values: Vec<(&str, SqliteValue)> = statement
            .params()
            .iter()
            .map(|(name, param)| (name, to_sqlite_value(param)))
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = values
            .iter()
            .map(|(name, value)| (*name, value as &dyn ToSql))
            .collect();
        let names: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = prepared.query(named.as_slice())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Map::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                map.insert(name.clone(), to_json(row.get_ref(index)?));
            }
            out.push(map);
        }
        Ok(out)
    }

    fn execute_statement(
        conn: &rusqlite::Connection,
        sql: &str,
        statement: &BoundStatement,
    ) -> StorageResult<u64> {
        let mut prepared = conn.prepare_cached(sql)?;
        let values: Vec<(&str, SqliteValue)> = statement
            .params()
            .iter()
            .map(|(name, param)| (name, to_sqlite_value(param)))
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = values
            .iter()
            .map(|(name, value)| (*name, value as &dyn ToSql))
            .collect();
        Ok(prepared.execute(named.as_slice())? as u64)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    async fn connect(&self) -> StorageResult<()> {
        let mut guard = self.conn.lock();
        if guard.is_some() {
            return Ok(());
        }

        let conn = self.pool.get().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })?;
        self.configure(&conn)?;

        *guard = Some(conn);
        tracing::info!(path = %self.config.path, "connected to sqlite");
        Ok(())
    }

    async fn disconnect(&self) -> StorageResult<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };

        if !conn.is_autocommit() {
            tracing::warn!(
                path = %self.config.path,
                "disconnecting with an open transaction, rolling back"
            );
            conn.execute_batch("ROLLBACK")?;
        }

        conn.flush_prepared_statement_cache();
        self.statements.lock().clear();
        tracing::debug!(path = %self.config.path, "disconnected from sqlite");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.conn
            .lock()
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }

    async fn begin(&self) -> StorageResult<()> {
        self.with_conn(|conn| Ok(conn.execute_batch("BEGIN")?))
    }

    async fn commit(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
            }
            Ok(())
        })
    }

    async fn rollback(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
            }
            Ok(())
        })
    }

    async fn fetch_all(&self, statement: &BoundStatement) -> StorageResult<Vec<Row>> {
        let start = Instant::now();
        let sql = self.cached_sql(statement);
        let rows = self.with_conn(|conn| Self::query_rows(conn, &sql, statement))?;
        tracing::debug!(
            key = statement.key().short(),
            params = statement.params().len(),
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "statement executed"
        );
        Ok(rows)
    }

    async fn execute(&self, statement: &BoundStatement) -> StorageResult<u64> {
        let start = Instant::now();
        let sql = self.cached_sql(statement);
        let affected = self.with_conn(|conn| Self::execute_statement(conn, &sql, statement))?;
        tracing::debug!(
            key = statement.key().short(),
            params = statement.params().len(),
            affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "statement executed"
        );
        Ok(affected)
    }

    fn param_limit(&self) -> ParamLimit {
        self.param_limit
    }

    fn cache_stats(&self) -> CacheStats {
        self.statements.lock().stats()
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            if !conn.is_autocommit() {
                tracing::warn!(
                    path = %self.config.path,
                    "dropping sqlite connection with an open transaction"
                );
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %e, "rollback on drop failed");
                }
            }
        }
    }
}

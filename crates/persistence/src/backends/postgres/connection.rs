//! PostgreSQL shard connection.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use parking_lot::Mutex;
use postgres_types::ToSql;
use tokio_postgres::Statement;

use crate::core::Connection;
use crate::dialect::DialectKind;
use crate::error::{BackendError, PreconditionError, StorageError, StorageResult};
use crate::query::{BoundStatement, CacheStats, ParamLimit, StatementCache, StatementKey};
use crate::types::Row;

use super::config::PostgresConfig;
use super::convert::{row_to_json, to_pg_params};
use super::placeholders::to_positional;

/// A connection to one PostgreSQL shard.
///
/// A pooled client is checked out on [`connect`](Connection::connect) and held
/// until [`disconnect`](Connection::disconnect), so transactions and prepared
/// statements stay on one server session.
pub struct PostgresConnection {
    config: PostgresConfig,
    pool: Pool,
    client: tokio::sync::Mutex<Option<Object>>,
    cache: Mutex<StatementCache<Statement>>,
    connected: AtomicBool,
    in_transaction: AtomicBool,
    param_limit: ParamLimit,
}

impl Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("dbname", &self.config.dbname)
            .field("connected", &self.is_connected())
            .field("in_transaction", &self.in_transaction())
            .field("param_limit", &self.param_limit)
            .finish_non_exhaustive()
    }
}

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "postgres".to_string(),
        message,
        source: None,
    })
}

impl PostgresConnection {
    /// Creates an unconnected connection with its own pool.
    pub fn new(config: PostgresConfig) -> StorageResult<Self> {
        let pool = config.create_pool()?;
        let cache = StatementCache::new(config.statement_cache_capacity);
        Ok(Self {
            config,
            pool,
            client: tokio::sync::Mutex::new(None),
            cache: Mutex::new(cache),
            connected: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
            param_limit: ParamLimit::for_dialect(DialectKind::Postgres),
        })
    }

    /// Creates a connection from `TESSERA_PG_*` environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(PostgresConfig::from_env())
    }

    /// Overrides the bound-parameter ceiling.
    pub fn with_param_limit(mut self, limit: ParamLimit) -> Self {
        self.param_limit = limit;
        self
    }

    /// Connection settings.
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    async fn prepare(
        &self,
        client: &Object,
        key: &StatementKey,
        sql: &str,
    ) -> StorageResult<Statement> {
        if let Some(statement) = self.cache.lock().get(key).cloned() {
            return Ok(statement);
        }
        let statement = client.prepare(sql).await?;
        self.cache.lock().insert(key.clone(), statement.clone());
        Ok(statement)
    }

    async fn run_control(&self, command: &str) -> StorageResult<()> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(PreconditionError::NotConnected)?;
        client.batch_execute(command).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn name(&self) -> &'static str {
        "postgres"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> StorageResult<()> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let client = self.pool.get().await.map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "postgres".to_string(),
                message: e.to_string(),
            })
        })?;

        client
            .batch_execute(&format!(
                "SET statement_timeout = {}",
                self.config.statement_timeout_ms
            ))
            .await
            .map_err(|e| internal_error(format!("Failed to set statement_timeout: {}", e)))?;

        *guard = Some(client);
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            dbname = %self.config.dbname,
            "connected to postgres"
        );
        Ok(())
    }

    async fn disconnect(&self) -> StorageResult<()> {
        let mut guard = self.client.lock().await;
        let Some(client) = guard.take() else {
            return Ok(());
        };

        if self.in_transaction.swap(false, Ordering::SeqCst) {
            tracing::warn!(
                dbname = %self.config.dbname,
                "disconnecting with an open transaction, rolling back"
            );
            if client.batch_execute("ROLLBACK").await.is_err() {
                // Keep a session in an unknown state out of the pool.
                drop(Object::take(client));
            }
        }

        self.cache.lock().clear();
        self.connected.store(false, Ordering::SeqCst);
        tracing::debug!(dbname = %self.config.dbname, "disconnected from postgres");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> StorageResult<()> {
        self.run_control("BEGIN").await?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> StorageResult<()> {
        if !self.in_transaction() {
            return Ok(());
        }
        let result = self.run_control("COMMIT").await;
        self.in_transaction.store(false, Ordering::SeqCst);
        result
    }

    async fn rollback(&self) -> StorageResult<()> {
        if !self.in_transaction() {
            return Ok(());
        }
        let result = self.run_control("ROLLBACK").await;
        self.in_transaction.store(false, Ordering::SeqCst);
        result
    }

    async fn fetch_all(&self, statement: &BoundStatement) -> StorageResult<Vec<Row>> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(PreconditionError::NotConnected)?;

        let sql = to_positional(statement.sql(), statement.params())?;
        let prepared = self.prepare(client, statement.key(), &sql).await?;
        let params = to_pg_params(statement.params(), prepared.params())?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let start = Instant::now();
        let rows = client.query(&prepared, &param_refs).await?;
        tracing::debug!(
            key = statement.key().short(),
            params = param_refs.len(),
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "statement executed"
        );

        rows.iter().map(row_to_json).collect()
    }

    async fn execute(&self, statement: &BoundStatement) -> StorageResult<u64> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(PreconditionError::NotConnected)?;

        let sql = to_positional(statement.sql(), statement.params())?;
        let prepared = self.prepare(client, statement.key(), &sql).await?;
        let params = to_pg_params(statement.params(), prepared.params())?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let start = Instant::now();
        let affected = client.execute(&prepared, &param_refs).await?;
        tracing::debug!(
            key = statement.key().short(),
            params = param_refs.len(),
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
        self.cache.lock().stats()
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        if self.in_transaction.load(Ordering::SeqCst) {
            tracing::warn!(
                dbname = %self.config.dbname,
                "dropping postgres connection with an open transaction"
            );
            // The server rolls back when the session closes.
            if let Some(client) = self.client.get_mut().take() {
                drop(Object::take(client));
            }
        }
    }
}

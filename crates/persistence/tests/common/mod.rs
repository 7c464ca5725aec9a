//! Test infrastructure for the persistence layer.
//!
//! [`MockConnection`] records every statement it receives and answers reads
//! from a script, so collection and model behavior can be checked without a
//! database.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use tessera_persistence::core::{Connection, DEFAULT_ROUTE, ShardManager};
use tessera_persistence::dialect::DialectKind;
use tessera_persistence::error::{BackendError, PreconditionError, StorageResult};
use tessera_persistence::query::{BoundStatement, ParamLimit};
use tessera_persistence::types::Row;

pub use fixtures::*;

/// A scripted, recording connection.
#[derive(Debug)]
pub struct MockConnection {
    kind: DialectKind,
    limit: ParamLimit,
    connected: AtomicBool,
    in_transaction: AtomicBool,
    connects: AtomicUsize,
    statements: Mutex<Vec<BoundStatement>>,
    controls: Mutex<Vec<&'static str>>,
    responses: Mutex<VecDeque<Vec<Row>>>,
    affected: Mutex<VecDeque<u64>>,
    fail_on: AtomicUsize,
}

impl MockConnection {
    /// An unconnected mock speaking `kind`.
    pub fn new(kind: DialectKind) -> Self {
        Self {
            kind,
            limit: ParamLimit::for_dialect(kind),
            connected: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            statements: Mutex::new(Vec::new()),
            controls: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            affected: Mutex::new(VecDeque::new()),
            fail_on: AtomicUsize::new(0),
        }
    }

    /// Overrides the parameter ceiling.
    pub fn with_param_limit(mut self, limit: usize) -> Self {
        self.limit = ParamLimit::from_config(limit);
        self
    }

    /// Queues the rows returned by the next `fetch_all`.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.responses.lock().push_back(rows);
    }

    /// Queues the count returned by the next `execute`.
    pub fn push_affected(&self, count: u64) {
        self.affected.lock().push_back(count);
    }

    /// Makes the `n`th statement (1-based) fail with an engine error. The
    /// failing statement is still recorded.
    pub fn fail_on(&self, n: usize) {
        self.fail_on.store(n, Ordering::SeqCst);
    }

    /// Statements received so far, in order.
    pub fn statements(&self) -> Vec<BoundStatement> {
        self.statements.lock().clone()
    }

    /// Transaction control commands received so far.
    pub fn controls(&self) -> Vec<&'static str> {
        self.controls.lock().clone()
    }

    /// Number of `connect` calls that opened the connection.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn record(&self, statement: &BoundStatement) -> StorageResult<()> {
        let mut statements = self.statements.lock();
        statements.push(statement.clone());
        if statements.len() == self.fail_on.load(Ordering::SeqCst) {
            return Err(BackendError::Engine {
                backend_name: "mock".to_string(),
                code: Some("57014".to_string()),
                message: format!("statement {} failed", statements.len()),
                source: None,
            }
            .into());
        }
        Ok(())
    }

    fn require_connected(&self) -> StorageResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(PreconditionError::NotConnected.into())
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn kind(&self) -> DialectKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> StorageResult<()> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn disconnect(&self) -> StorageResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> StorageResult<()> {
        self.require_connected()?;
        self.controls.lock().push("BEGIN");
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> StorageResult<()> {
        self.require_connected()?;
        self.controls.lock().push("COMMIT");
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> StorageResult<()> {
        self.require_connected()?;
        self.controls.lock().push("ROLLBACK");
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_all(&self, statement: &BoundStatement) -> StorageResult<Vec<Row>> {
        self.require_connected()?;
        self.record(statement)?;
        Ok(self.responses.lock().pop_front().unwrap_or_default())
    }

    async fn execute(&self, statement: &BoundStatement) -> StorageResult<u64> {
        self.require_connected()?;
        self.record(statement)?;
        Ok(self.affected.lock().pop_front().unwrap_or(0))
    }

    fn param_limit(&self) -> ParamLimit {
        self.limit
    }
}

/// A shard manager with `conn` on the default route.
pub fn shards_with(conn: Arc<MockConnection>) -> Arc<ShardManager> {
    let shards = ShardManager::new();
    shards
        .attach(DEFAULT_ROUTE, conn)
        .expect("default route is valid");
    Arc::new(shards)
}

//! Row collections backed by one table.
//!
//! A [`Collection`] holds the rows of its last read or write. Reads go
//! through [`Collection::populate`]; bulk writes through
//! [`Collection::insert_all`] and [`Collection::delete_all`]. Requests whose
//! parameter count exceeds the connection's ceiling are split and the
//! sub-statements issued one after another; their rows are concatenated in
//! order before formatting.
//!
//! Every statement of a split request is built, and therefore validated,
//! before the first one is sent. Sub-statements are not atomic as a group;
//! wrap the call in a transaction when that matters.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera_persistence::collection::Collection;
//! use tessera_persistence::query::{QueryRequest, SortDirection};
//! use tessera_persistence::types::TableDescriptor;
//!
//! let descriptor = TableDescriptor::new("products").with_sort_columns(["name"]);
//! let mut products = Collection::new(descriptor).with_db(shards.clone());
//!
//! let request = QueryRequest::new()
//!     .filter("i/brand", ["acme", "globex"])
//!     .sort("name", SortDirection::Asc);
//! let rows = products.populate(&request).await?;
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use crate::core::{Connection, DEFAULT_ROUTE, ShardManager};
use crate::error::{PreconditionError, StorageResult};
use crate::query::write::check_rows;
use crate::query::{
    BatchPlan, BoundStatement, QueryRequest, SelectBuilder, WriteMode, rows_per_batch,
};
use crate::types::{Row, TableDescriptor};

/// Per-collection customization points.
pub trait CollectionHooks: Send + Sync + Debug {
    /// Post-processes rows after every read or insert.
    fn format(&self, _rows: &mut Vec<Row>) {}

    /// Rows to write for `mode`. Defaults to the collection's rows unchanged.
    fn prepare_elements(&self, _mode: WriteMode, rows: &[Row]) -> Vec<Row> {
        rows.to_vec()
    }
}

#[derive(Debug, Default)]
struct NoHooks;

impl CollectionHooks for NoHooks {}

/// Rows of one table, read and written through a shard route.
#[derive(Debug)]
pub struct Collection {
    descriptor: TableDescriptor,
    db: Option<Arc<ShardManager>>,
    route: String,
    hooks: Arc<dyn CollectionHooks>,
    rows: Vec<Row>,
}

impl Collection {
    /// Creates an empty collection on the default route.
    pub fn new(descriptor: TableDescriptor) -> Self {
        Self {
            descriptor,
            db: None,
            route: DEFAULT_ROUTE.to_string(),
            hooks: Arc::new(NoHooks),
            rows: Vec::new(),
        }
    }

    /// Injects the shard manager.
    pub fn with_db(mut self, db: Arc<ShardManager>) -> Self {
        self.db = Some(db);
        self
    }

    /// Sets the shard route.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    /// Installs formatting and write-preparation hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn CollectionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Table description.
    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    /// Shard route.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Current rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Replaces the current rows.
    pub fn set_rows(&mut self, rows: Vec<Row>) -> &mut Self {
        self.rows = rows;
        self
    }

    /// Appends a row.
    pub fn push(&mut self, row: Row) -> &mut Self {
        self.rows.push(row);
        self
    }

    /// Drops every row.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consumes the collection, returning its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Connection behind the collection's route.
    pub fn connection(&self) -> StorageResult<Arc<dyn Connection>> {
        let db = self.db.as_ref().ok_or(PreconditionError::NoDatabase)?;
        db.fetch(&self.route)
    }

    /// Statements `populate` would issue for `request`, without running them.
    pub fn plan_select(
        &self,
        conn: &dyn Connection,
        request: &QueryRequest,
    ) -> StorageResult<Vec<BoundStatement>> {
        let in_transaction = conn.is_connected() && conn.in_transaction();
        let builder = SelectBuilder::new(conn.dialect(), &self.descriptor);
        builder.check(request, in_transaction)?;

        let limit = conn.param_limit();
        let params = request.param_count();
        match limit.max() {
            Some(max) if limit.exceeded_by(params) => {
                let plan = BatchPlan::plan(request, max)?;
                tracing::info!(
                    table = self.descriptor.table(),
                    params,
                    limit = max,
                    split_key = plan.split_key(),
                    batches = plan.len(),
                    chunk_size = plan.chunk_size(),
                    "splitting request into batches"
                );
                plan.sub_requests(request)
                    .map(|sub| builder.build(&sub, in_transaction))
                    .collect()
            }
            _ => Ok(vec![builder.build(request, in_transaction)?]),
        }
    }

    /// Reads the rows matching `request` and replaces the current rows with
    /// them.
    pub async fn populate(&mut self, request: &QueryRequest) -> StorageResult<&[Row]> {
        let conn = self.connection()?;
        let statements = self.plan_select(conn.as_ref(), request)?;

        if !conn.is_connected() {
            conn.connect().await?;
        }

        let mut rows = Vec::new();
        for statement in &statements {
            rows.extend(conn.fetch_all(statement).await?);
        }

        self.hooks.format(&mut rows);
        self.rows = rows;
        Ok(&self.rows)
    }

    /// Statements a bulk write of `rows` would issue, without running them.
    pub fn plan_write(
        &self,
        conn: &dyn Connection,
        mode: WriteMode,
        rows: &[Row],
    ) -> StorageResult<Vec<BoundStatement>> {
        let columns = check_rows(rows)?.len();
        if columns == 0 {
            return Ok(Vec::new());
        }

        let limit = conn.param_limit();
        let params = rows.len() * columns;
        let per_batch = match limit.max() {
            Some(max) if limit.exceeded_by(params) => {
                let per_batch = rows_per_batch(max, columns)?;
                tracing::info!(
                    table = self.descriptor.table(),
                    %mode,
                    rows = rows.len(),
                    columns,
                    limit = max,
                    rows_per_batch = per_batch,
                    "splitting bulk write into batches"
                );
                per_batch
            }
            _ => rows.len(),
        };

        rows.chunks(per_batch)
            .map(|chunk| mode.build(conn.dialect(), self.descriptor.table(), chunk))
            .collect()
    }

    /// Inserts the current rows and replaces them with the inserted rows as
    /// returned by the database.
    pub async fn insert_all(&mut self) -> StorageResult<&[Row]> {
        let conn = self.connection()?;
        if self.rows.is_empty() {
            return Ok(&self.rows);
        }

        let rows = self.hooks.prepare_elements(WriteMode::Insert, &self.rows);
        let statements = self.plan_write(conn.as_ref(), WriteMode::Insert, &rows)?;

        if !conn.is_connected() {
            conn.connect().await?;
        }

        let mut inserted = Vec::with_capacity(rows.len());
        for statement in &statements {
            inserted.extend(conn.fetch_all(statement).await?);
        }

        self.hooks.format(&mut inserted);
        self.rows = inserted;
        Ok(&self.rows)
    }

    /// Deletes every stored row equal, column by column, to one of the current
    /// rows. Returns the number of deleted rows.
    pub async fn delete_all(&mut self) -> StorageResult<u64> {
        let conn = self.connection()?;
        if self.rows.is_empty() {
            return Ok(0);
        }

        let rows = self.hooks.prepare_elements(WriteMode::Delete, &self.rows);
        let statements = self.plan_write(conn.as_ref(), WriteMode::Delete, &rows)?;

        if !conn.is_connected() {
            conn.connect().await?;
        }

        let mut deleted = 0;
        for statement in &statements {
            deleted += conn.execute(statement).await?;
        }
        Ok(deleted)
    }
}

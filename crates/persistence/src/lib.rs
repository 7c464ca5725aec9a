//! Tessera Persistence Layer
//!
//! This crate builds parameterized SQL for PostgreSQL, SQL Server and SQLite
//! from declarative requests, splits requests that would bind more parameters
//! than an engine accepts, and routes statements to named database shards.
//!
//! # Features
//!
//! - **Declarative reads**: filters with `~` negation and `i` case folding,
//!   sorting against an allow-list, subsets, `DISTINCT`, `COUNT` and `SUM`
//!   with grouping, and row locks
//! - **Parameter batching**: one multi-valued filter is split across as many
//!   statements as needed, every statement built before any runs
//! - **Bulk writes**: multi-row `INSERT ... RETURNING` and `DELETE` chunked by
//!   row width
//! - **Sharding**: routes map to connections with a `__DEFAULT__` fallback
//! - **Statement caching**: prepared statements keyed by normalized SQL
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! tessera-persistence = { version = "0.3", features = ["postgres"] }
//! ```
//!
//! - `sqlite` (default) - SQLite with in-memory and file modes
//! - `postgres` - PostgreSQL through a deadpool connection pool
//! - `cli` - the `tessera-query` command line tool
//!
//! # Architecture
//!
//! - [`query`] - requests, statement builders, limits and batching
//! - [`dialect`] - per-engine syntax
//! - [`core`] - the connection trait, shard routing and transactions
//! - [`collection`] - multi-row reads and writes for one table
//! - [`model`] - single-entity CRUD
//! - [`config`] - shard and route configuration
//! - [`backends`] - connection implementations
//! - [`error`] - error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use tessera_persistence::dialect::DialectKind;
//! use tessera_persistence::query::{QueryRequest, SelectBuilder};
//! use tessera_persistence::types::TableDescriptor;
//!
//! let products = TableDescriptor::new("products");
//! let request = QueryRequest::new().filter("product_id", [1, 2]);
//!
//! let statement = SelectBuilder::new(DialectKind::Postgres.dialect(), &products)
//!     .build(&request, false)
//!     .unwrap();
//!
//! assert_eq!(
//!     statement.sql(),
//!     "SELECT * FROM \"products\" WHERE \"product_id\" IN (:product_id_0, :product_id_1) AND 1=1 "
//! );
//! assert_eq!(statement.params().len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod collection;
pub mod config;
pub mod core;
pub mod dialect;
pub mod error;
pub mod model;
pub mod query;
pub mod types;

// Re-export commonly used types at crate root
pub use collection::{Collection, CollectionHooks};
pub use config::{DatabaseConfig, ShardConfig, build_shard_manager};
pub use error::{StorageError, StorageResult};
pub use model::{Entity, ModelStore};
pub use query::{BoundParams, BoundStatement, QueryRequest, SqlParam};
pub use types::{Row, TableDescriptor};

// Re-export core traits
pub use core::{Connection, DEFAULT_ROUTE, ShardManager};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

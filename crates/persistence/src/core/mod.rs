//! Connection traits and shard routing.
//!
//! - [`Connection`] - one database shard, spoken to with `:name` statements
//! - [`ShardManager`] - maps routes to connections with a default fallback
//! - [`transaction`] - lazy-connect transaction helpers and table locks
//!
//! ```text
//! Collection / ModelStore
//!     └── ShardManager::fetch(route)
//!             └── Arc<dyn Connection>
//!                     ├── PostgresConnection (feature "postgres")
//!                     └── SqliteConnection   (feature "sqlite")
//! ```

pub mod connection;
pub mod shard;
pub mod transaction;

pub use connection::Connection;
pub use shard::{DEFAULT_ROUTE, ShardManager};
pub use transaction::{
    begin_transaction, commit_transaction, is_in_transaction, lock_table, rollback_transaction,
};

//! SQLite backend.
//!
//! Supports in-memory databases (handy for tests) and file-backed ones.
//! Row locking is not available: a `__lock` request is rejected as an
//! unsupported directive and `LOCK TABLE` as an unsupported capability,
//! before anything runs.
//!
//! # Example
//!
//! ```no_run
//! use tessera_persistence::backends::sqlite::SqliteConnection;
//! use tessera_persistence::core::Connection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = SqliteConnection::in_memory()?;
//! conn.connect().await?;
//! conn.execute_batch("CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT)")?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;

pub use config::{MEMORY_PATH, SqliteConfig};
pub use connection::SqliteConnection;

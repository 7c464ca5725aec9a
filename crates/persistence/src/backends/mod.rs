//! Database backend implementations.
//!
//! Each backend implements [`Connection`](crate::core::Connection) and is
//! gated behind a feature flag.
//!
//! | Backend | Feature | Placeholders |
//! |---------|---------|--------------|
//! | SQLite | `sqlite` (default) | `:name`, native |
//! | PostgreSQL | `postgres` | rewritten to `$n` |
//!
//! SQL Server statements can be built through
//! [`SqlServerDialect`](crate::dialect::SqlServerDialect) but no driver ships
//! with this crate.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

//! SQLite connection settings.

use serde::{Deserialize, Serialize};

use crate::config::ShardConfig;
use crate::query::cache::DEFAULT_STATEMENT_CACHE_CAPACITY;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Configuration for a SQLite shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,

    /// Prepared statements kept per connection.
    #[serde(default = "default_statement_cache_capacity")]
    pub statement_cache_capacity: usize,
}

fn default_path() -> String {
    MEMORY_PATH.to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_statement_cache_capacity() -> usize {
    DEFAULT_STATEMENT_CACHE_CAPACITY
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_foreign_keys: true,
            statement_cache_capacity: default_statement_cache_capacity(),
        }
    }
}

impl SqliteConfig {
    /// In-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Settings of a configured shard.
    pub fn from_shard(shard: &ShardConfig) -> Self {
        Self {
            path: shard.path.clone().unwrap_or_else(default_path),
            max_connections: u32::try_from(shard.max_connections)
                .unwrap_or(u32::MAX)
                .max(1),
            busy_timeout_ms: u32::try_from(shard.statement_timeout_ms)
                .unwrap_or(u32::MAX),
            ..Self::default()
        }
    }

    /// Whether the database lives in memory.
    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }
}

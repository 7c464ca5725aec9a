//! Error types for the persistence layer.
//!
//! This module defines all error types used throughout the persistence layer,
//! following a hierarchy that separates malformed requests, infeasible batches,
//! unmet preconditions, engine failures, configuration problems and missing
//! entities.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
///
/// This enum encompasses all possible errors that can occur during persistence
/// operations, organized by category.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The request could not be turned into a statement
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The request exceeds the parameter limit and cannot be split
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The connection is not in a state that allows the operation
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A single entity lookup matched zero rows
    #[error(transparent)]
    NotFound(#[from] EntityNotFound),
}

/// Errors caused by a malformed query or write request.
///
/// All of these are raised before any statement reaches the database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Sorting directive has the wrong shape, an unknown direction or a column
    /// outside the allow-list.
    #[error("incorrect sorting data: {message}")]
    InvalidSorting { message: String },

    /// Subset directive has a non-positive limit or a negative offset.
    #[error("incorrect subset data: {message}")]
    InvalidSubset { message: String },

    /// A distinct, count, sum or lock directive is empty or has the wrong type.
    #[error("incorrect {directive} data: {message}")]
    InvalidDirective { directive: String, message: String },

    /// Both `__count` and `__sum` were requested.
    #[error("__count and __sum are mutually exclusive")]
    CountAndSum,

    /// A filter was given without any values.
    #[error("incorrect filter param provided [{key}], non-empty list expected")]
    EmptyFilter { key: String },

    /// A filter value is null or an empty string.
    #[error("incorrect filter value [{key}] at position {index}, non-empty value expected")]
    EmptyFilterValue { key: String, index: usize },

    /// A filter value is not a scalar.
    #[error("incorrect filter value [{key}] at position {index}, scalar expected")]
    NonScalarFilterValue { key: String, index: usize },

    /// A reserved directive name was used as a filter key.
    #[error("reserved directive '{key}' cannot be used as a filter")]
    ReservedFilterKey { key: String },

    /// Two placeholders with the same name were generated for one statement.
    #[error("duplicate bind parameter {name}")]
    DuplicatePlaceholder { name: String },

    /// The SQL text names a placeholder that has no bound value.
    #[error("placeholder {name} has no bound value")]
    UnboundPlaceholder { name: String },

    /// Rows handed to a bulk write do not share the same column set.
    #[error("row {index} does not match the column set of the first row")]
    InconsistentColumns { index: usize },

    /// A row handed to a write has no columns.
    #[error("row {index} has no columns")]
    EmptyRow { index: usize },

    /// The request payload is not a JSON object.
    #[error("request must be a JSON object")]
    NotAnObject,

    /// The target dialect cannot express the requested directive.
    #[error("{dialect} does not support {directive}")]
    UnsupportedDirective { dialect: String, directive: String },
}

/// Errors raised while planning a batched execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// More than one filter carries multiple values.
    #[error("cannot split request: {} filters carry multiple values ({})", .columns.len(), .columns.join(", "))]
    MultipleSplitColumns { columns: Vec<String> },

    /// No filter carries multiple values, so there is nothing to split.
    #[error("cannot split request: {params} parameters exceed the limit of {limit} and no filter carries multiple values")]
    NoSplitColumn { params: usize, limit: usize },

    /// The fixed filters alone consume the whole parameter budget.
    #[error("cannot split request: {fixed} fixed filters leave no room under the limit of {limit}")]
    ChunkSizeExhausted { fixed: usize, limit: usize },

    /// A single row has more columns than the parameter limit.
    #[error("cannot split rows: {columns} columns per row exceed the limit of {limit}")]
    RowTooWide { columns: usize, limit: usize },
}

/// Errors raised when a connection or manager is in the wrong state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// No shard manager was injected.
    #[error("cannot access the database prior to injecting a shard manager")]
    NoDatabase,

    /// A lock was requested while no transaction is open.
    #[error("cannot lock {table} outside of a transaction")]
    LockOutsideTransaction { table: String },

    /// A statement was issued before connecting.
    #[error("cannot execute statements prior to establishing a connection")]
    NotConnected,

    /// Routes must be non-empty.
    #[error("incorrect route provided, non-empty string expected")]
    EmptyRoute,

    /// Neither the route nor the default route is attached.
    #[error("impossible to fetch the route '{route}'")]
    UnknownRoute { route: String },
}

/// Errors related to backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// The engine rejected a statement.
    ///
    /// `code` carries the engine-native code (SQLSTATE for PostgreSQL, the
    /// extended result code for SQLite) when the driver reports one.
    #[error("{backend_name} error{}: {message}", .code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Engine {
        backend_name: String,
        code: Option<String>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested capability is not supported by this backend.
    #[error("capability '{capability}' not supported by {backend_name}")]
    UnsupportedCapability {
        backend_name: String,
        capability: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

impl BackendError {
    /// Returns the engine-native error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            BackendError::Engine { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the engine reported a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(sql_state::UNIQUE_VIOLATION)
    }

    /// Whether the engine reported a missing table.
    pub fn is_undefined_table(&self) -> bool {
        self.code() == Some(sql_state::UNDEFINED_TABLE)
    }
}

/// SQLSTATE codes the PostgreSQL backend callers commonly branch on.
pub mod sql_state {
    /// Relation does not exist.
    pub const UNDEFINED_TABLE: &str = "42P01";
    /// Relation already exists.
    pub const DUPLICATE_TABLE: &str = "42P07";
    /// Unique constraint violated.
    pub const UNIQUE_VIOLATION: &str = "23505";
}

/// Errors related to database configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot set up database access: no shards are defined")]
    NoShards,

    #[error("no config defined for the shard: {shard}")]
    MissingShardConfig { shard: String },

    #[error("cannot set up database access: no shard routes are defined")]
    NoRoutes,

    #[error("cannot set up database access: default route is not defined")]
    MissingDefaultRoute,

    #[error("route '{route}' points at unknown shard '{shard}'")]
    UnknownShard { route: String, shard: String },

    #[error("driver '{driver}' for shard '{shard}' is not compiled in")]
    DriverUnavailable { shard: String, driver: String },

    #[error("failed to parse configuration: {message}")]
    Parse { message: String },

    #[error("failed to read configuration file {path}: {message}")]
    Io { path: String, message: String },
}

/// A single entity lookup matched zero rows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no entity found - ID: {id}. Entity type: {entity}")]
pub struct EntityNotFound {
    pub entity: String,
    pub id: String,
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code.to_string()),
            _ => None,
        };
        StorageError::Backend(BackendError::Engine {
            backend_name: "sqlite".to_string(),
            code,
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        let code = err.code().map(|c| c.code().to_string());
        let message = err
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| err.to_string());
        StorageError::Backend(BackendError::Engine {
            backend_name: "postgres".to_string(),
            code,
            message,
            source: Some(Box::new(err)),
        })
    }
}

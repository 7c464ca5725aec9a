//! Database configuration.
//!
//! Shards and routes are read from TOML:
//!
//! ```toml
//! [database]
//! shards = ["main", "archive"]
//!
//! [database.routes]
//! __DEFAULT__ = "main"
//! reports = "archive"
//!
//! [database_shards.main]
//! driver = "postgres"
//! host = "localhost"
//! port = 5432
//! dbname = "app"
//! user = "app"
//! password = "secret"
//!
//! [database_shards.archive]
//! driver = "sqlite"
//! path = "/var/lib/app/archive.db"
//! param_limit = 999
//! ```
//!
//! [`DatabaseConfig::validate`] applies the same checks, in the same order,
//! as shard setup: shards listed, every shard configured, routes listed, a
//! default route present, every route pointing at a listed shard.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{Connection, DEFAULT_ROUTE, ShardManager};
use crate::dialect::DialectKind;
use crate::error::{ConfigError, StorageResult};
use crate::query::ParamLimit;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Shard list and routes.
    #[serde(default)]
    pub database: DatabaseSection,

    /// Per-shard connection settings, keyed by shard name.
    #[serde(default)]
    pub database_shards: BTreeMap<String, ShardConfig>,
}

/// The `[database]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Names of the shards to set up.
    #[serde(default)]
    pub shards: Vec<String>,

    /// Route name to shard name.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

/// Connection settings of one shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Engine behind the shard.
    pub driver: DialectKind,

    /// Server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port. Defaults to the engine's usual port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    #[serde(default, alias = "dbName")]
    pub dbname: Option<String>,

    /// Login user.
    #[serde(default)]
    pub user: Option<String>,

    /// Login password.
    #[serde(default)]
    pub password: Option<String>,

    /// Database file for SQLite shards. In-memory when absent.
    #[serde(default)]
    pub path: Option<String>,

    /// Bound-parameter ceiling override; `0` disables batching.
    #[serde(default)]
    pub param_limit: Option<usize>,

    /// Statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_statement_timeout_ms() -> u64 {
    30000
}

fn default_max_connections() -> usize {
    10
}

impl ShardConfig {
    /// Settings for a shard of the given engine with every other field defaulted.
    pub fn new(driver: DialectKind) -> Self {
        Self {
            driver,
            host: default_host(),
            port: None,
            dbname: None,
            user: None,
            password: None,
            path: None,
            param_limit: None,
            statement_timeout_ms: default_statement_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }

    /// Ceiling used by connections to this shard.
    pub fn effective_param_limit(&self) -> ParamLimit {
        self.param_limit
            .map(ParamLimit::from_config)
            .unwrap_or_else(|| ParamLimit::for_dialect(self.driver))
    }
}

impl DatabaseConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> StorageResult<Self> {
        let config: DatabaseConfig = toml::from_str(source).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks shard and route consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.shards.is_empty() {
            return Err(ConfigError::NoShards);
        }
        for shard in &self.database.shards {
            if !self.database_shards.contains_key(shard) {
                return Err(ConfigError::MissingShardConfig {
                    shard: shard.clone(),
                });
            }
        }
        if self.database.routes.is_empty() {
            return Err(ConfigError::NoRoutes);
        }
        if !self.database.routes.contains_key(DEFAULT_ROUTE) {
            return Err(ConfigError::MissingDefaultRoute);
        }
        for (route, shard) in &self.database.routes {
            if !self.database.shards.contains(shard) {
                return Err(ConfigError::UnknownShard {
                    route: route.clone(),
                    shard: shard.clone(),
                });
            }
        }
        Ok(())
    }

    /// Settings of a listed shard.
    pub fn shard(&self, name: &str) -> Option<&ShardConfig> {
        self.database_shards.get(name)
    }
}

/// Creates one connection per shard and attaches it to every route naming
/// that shard. Connections are not opened until first use.
pub fn build_shard_manager(config: &DatabaseConfig) -> StorageResult<ShardManager> {
    config.validate()?;

    let mut connections: BTreeMap<&str, Arc<dyn Connection>> = BTreeMap::new();
    for name in &config.database.shards {
        let shard = config
            .shard(name)
            .ok_or_else(|| ConfigError::MissingShardConfig {
                shard: name.clone(),
            })?;
        connections.insert(name.as_str(), open_shard(name, shard)?);
    }

    let manager = ShardManager::new();
    for (route, shard) in &config.database.routes {
        let connection = connections
            .get(shard.as_str())
            .cloned()
            .ok_or_else(|| ConfigError::UnknownShard {
                route: route.clone(),
                shard: shard.clone(),
            })?;
        manager.attach(route, connection)?;
    }

    tracing::info!(
        shards = config.database.shards.len(),
        routes = config.database.routes.len(),
        "shard manager initialized"
    );
    Ok(manager)
}

#[allow(unused_variables)]
fn open_shard(name: &str, shard: &ShardConfig) -> StorageResult<Arc<dyn Connection>> {
    match shard.driver {
        #[cfg(feature = "postgres")]
        DialectKind::Postgres => {
            use crate::backends::postgres::{PostgresConfig, PostgresConnection};
            let connection =
                PostgresConnection::new(PostgresConfig::from_shard(shard))?
                    .with_param_limit(shard.effective_param_limit());
            Ok(Arc::new(connection))
        }
        #[cfg(feature = "sqlite")]
        DialectKind::Sqlite => {
            use crate::backends::sqlite::{SqliteConfig, SqliteConnection};
            let connection = SqliteConnection::new(SqliteConfig::from_shard(shard))?
                .with_param_limit(shard.effective_param_limit());
            Ok(Arc::new(connection))
        }
        other => Err(ConfigError::DriverUnavailable {
            shard: name.to_string(),
            driver: other.to_string(),
        }
        .into()),
    }
}

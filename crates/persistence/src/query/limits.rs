//! Bound-parameter ceilings per engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dialect::DialectKind;

/// PostgreSQL wire protocol ceiling (a 16-bit parameter count).
pub const POSTGRES_MAX_PARAMETERS: usize = u16::MAX as usize;

/// SQL Server RPC ceiling.
pub const SQLSERVER_MAX_PARAMETERS: usize = 2100;

/// SQLite `SQLITE_MAX_VARIABLE_NUMBER` default since 3.32.
pub const SQLITE_MAX_PARAMETERS: usize = 32766;

/// Maximum number of bound parameters a single statement may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLimit {
    /// No ceiling applies.
    Unlimited,
    /// At most this many parameters per statement.
    Max(usize),
}

impl ParamLimit {
    /// Default ceiling for a dialect.
    pub fn for_dialect(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Postgres => ParamLimit::Max(POSTGRES_MAX_PARAMETERS),
            DialectKind::SqlServer => ParamLimit::Max(SQLSERVER_MAX_PARAMETERS),
            DialectKind::Sqlite => ParamLimit::Max(SQLITE_MAX_PARAMETERS),
        }
    }

    /// Builds a limit from a configured override, where `0` means unlimited.
    pub fn from_config(value: usize) -> Self {
        if value == 0 {
            ParamLimit::Unlimited
        } else {
            ParamLimit::Max(value)
        }
    }

    /// The ceiling, if any.
    pub fn max(&self) -> Option<usize> {
        match self {
            ParamLimit::Unlimited => None,
            ParamLimit::Max(n) => Some(*n),
        }
    }

    /// Whether a statement with `count` parameters would break the ceiling.
    pub fn exceeded_by(&self, count: usize) -> bool {
        self.max().is_some_and(|max| count > max)
    }
}

impl fmt::Display for ParamLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamLimit::Unlimited => write!(f, "unlimited"),
            ParamLimit::Max(n) => write!(f, "{}", n),
        }
    }
}

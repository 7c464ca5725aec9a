//! Query construction.
//!
//! This module turns a [`QueryRequest`] into dialect-specific SQL plus a
//! [`BoundParams`] set:
//!
//! - [`filter`] - filter key parsing (`~` negation, `i` case folding)
//! - [`request`] - the typed request and its JSON form
//! - [`builder`] - `SELECT` sequencing
//! - [`write`] - `INSERT`, `UPDATE` and `DELETE` statements
//! - [`limits`] - per-engine parameter ceilings
//! - [`batch`] - splitting requests that exceed a ceiling
//! - [`cache`] - statement cache keys
//! - [`tools`] - post-processing of generated SQL

pub mod batch;
pub mod builder;
pub mod cache;
pub mod filter;
pub mod limits;
pub mod params;
pub mod request;
pub mod statement;
pub mod tools;
pub mod write;

pub use batch::{BatchPlan, rows_per_batch};
pub use builder::{COUNT_ALIAS, SUM_ALIAS, SelectBuilder};
pub use cache::{CacheStats, StatementCache, StatementKey};
pub use filter::{FilterModifier, FilterOperator, ParsedFilter, parse_filter_key};
pub use limits::ParamLimit;
pub use params::{BoundParams, SqlParam};
pub use request::{Filter, Projection, QueryRequest, Sort, SortDirection, Subset};
pub use statement::BoundStatement;
pub use tools::without_query_params;
pub use write::{
    WriteMode, build_delete, build_delete_by_id, build_entity_insert, build_entity_update,
    build_insert, build_select_by_id,
};

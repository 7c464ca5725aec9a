//! Core types shared by collections, models and backends.

mod descriptor;
pub mod row;

pub use descriptor::TableDescriptor;
pub use row::Row;

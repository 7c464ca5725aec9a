//! Single-entity persistence.
//!
//! An [`Entity`] lists its own columns; [`ModelStore`] turns that list into
//! `INSERT`, `SELECT`, `UPDATE` and `DELETE` statements keyed on the
//! identifier column, and merges rows returned by the database back into the
//! entity.

use std::sync::Arc;

use crate::core::{Connection, DEFAULT_ROUTE, ShardManager};
use crate::error::{EntityNotFound, StorageResult};
use crate::query::{
    SqlParam, build_delete_by_id, build_entity_insert, build_entity_update, build_select_by_id,
};
use crate::types::{Row, TableDescriptor};

/// A row-backed domain object.
pub trait Entity: Send + Sync {
    /// Table description.
    fn descriptor() -> TableDescriptor
    where
        Self: Sized;

    /// Type name reported in not-found errors.
    fn entity_name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }

    /// Shard route.
    fn route(&self) -> &str {
        DEFAULT_ROUTE
    }

    /// Identifier value.
    fn id(&self) -> SqlParam;

    /// Replaces the identifier value.
    fn set_id(&mut self, id: SqlParam);

    /// Column values to write, in a stable order, identifier excluded.
    fn columns(&self) -> Vec<(String, SqlParam)>;

    /// Copies values from a row returned by the database.
    fn merge(&mut self, row: &Row) -> StorageResult<()>;
}

/// Runs entity statements through a shard manager.
#[derive(Debug, Clone)]
pub struct ModelStore {
    db: Arc<ShardManager>,
}

impl ModelStore {
    /// Creates a store.
    pub fn new(db: Arc<ShardManager>) -> Self {
        Self { db }
    }

    /// The shard manager.
    pub fn db(&self) -> &Arc<ShardManager> {
        &self.db
    }

    async fn connection<E: Entity>(&self, entity: &E) -> StorageResult<Arc<dyn Connection>> {
        let conn = self.db.fetch(entity.route())?;
        if !conn.is_connected() {
            conn.connect().await?;
        }
        Ok(conn)
    }

    /// Inserts `entity` and merges the stored row, including generated
    /// columns, back into it.
    pub async fn create<E: Entity>(&self, entity: &mut E) -> StorageResult<()> {
        let conn = self.connection(entity).await?;
        let statement =
            build_entity_insert(conn.dialect(), &E::descriptor(), &entity.columns())?;
        let rows = conn.fetch_all(&statement).await?;
        if let Some(row) = rows.first() {
            entity.merge(row)?;
        }
        Ok(())
    }

    /// Loads the row with the entity's identifier into it.
    pub async fn read<E: Entity>(&self, entity: &mut E) -> StorageResult<()> {
        let conn = self.connection(entity).await?;
        let statement = build_select_by_id(conn.dialect(), &E::descriptor(), entity.id())?;
        let rows = conn.fetch_all(&statement).await?;
        match rows.as_slice() {
            [row] => entity.merge(row),
            _ => Err(not_found::<E>(entity).into()),
        }
    }

    /// Writes the entity's columns to its row and merges the stored row back.
    pub async fn update<E: Entity>(&self, entity: &mut E) -> StorageResult<()> {
        let conn = self.connection(entity).await?;
        let statement = build_entity_update(
            conn.dialect(),
            &E::descriptor(),
            &entity.columns(),
            entity.id(),
        )?;
        let rows = conn.fetch_all(&statement).await?;
        match rows.first() {
            Some(row) => entity.merge(row),
            None => Err(not_found::<E>(entity).into()),
        }
    }

    /// Deletes the entity's row. Returns the number of deleted rows.
    pub async fn delete<E: Entity>(&self, entity: &E) -> StorageResult<u64> {
        let conn = self.connection(entity).await?;
        let statement = build_delete_by_id(conn.dialect(), &E::descriptor(), entity.id())?;
        conn.execute(&statement).await
    }
}

fn not_found<E: Entity>(entity: &E) -> EntityNotFound {
    EntityNotFound {
        entity: E::entity_name().to_string(),
        id: entity.id().to_string(),
    }
}

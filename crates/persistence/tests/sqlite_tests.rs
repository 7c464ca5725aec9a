//! SQLite backend integration tests.
//!
//! These tests run collections and models end to end against in-memory and
//! file-backed SQLite databases, with a small parameter ceiling so batching
//! is exercised on realistic data.

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::{products, row};
use tessera_persistence::backends::sqlite::SqliteConnection;
use tessera_persistence::collection::Collection;
use tessera_persistence::config::{DatabaseConfig, build_shard_manager};
use tessera_persistence::core::{
    Connection, DEFAULT_ROUTE, ShardManager, begin_transaction, commit_transaction,
    lock_table, rollback_transaction,
};
use tessera_persistence::dialect::TableLockMode;
use tessera_persistence::error::{BackendError, RequestError, StorageError, StorageResult};
use tessera_persistence::model::{Entity, ModelStore};
use tessera_persistence::query::{
    BoundParams, BoundStatement, ParamLimit, QueryRequest, SortDirection, SqlParam, Subset,
};
use tessera_persistence::types::{Row, TableDescriptor};

const SCHEMA: &str = "CREATE TABLE products (
    product_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    brand TEXT,
    price INTEGER
)";

async fn create_db(limit: usize) -> (Arc<SqliteConnection>, Arc<ShardManager>) {
    let conn = SqliteConnection::in_memory()
        .expect("Failed to create SQLite connection")
        .with_param_limit(ParamLimit::Max(limit));
    conn.connect().await.expect("Failed to connect");
    conn.execute_batch(SCHEMA).expect("Failed to create schema");

    let conn = Arc::new(conn);
    let shards = ShardManager::new();
    shards.attach(DEFAULT_ROUTE, conn.clone()).unwrap();
    (conn, Arc::new(shards))
}

fn catalog(count: usize) -> Vec<Row> {
    let brands = ["Acme", "Globex", "Initech"];
    (0..count)
        .map(|i| {
            row(json!({
                "name": format!("item-{:02}", i),
                "brand": brands[i % brands.len()],
                "price": (i as i64 + 1) * 100,
            }))
        })
        .collect()
}

async fn seed(shards: &Arc<ShardManager>, count: usize) -> Vec<Row> {
    let mut collection = Collection::new(products()).with_db(shards.clone());
    collection.set_rows(catalog(count));
    collection.insert_all().await.expect("Failed to seed").to_vec()
}

fn ids(rows: &[Row]) -> Vec<i64> {
    let mut ids: Vec<i64> = rows
        .iter()
        .filter_map(|r| r.get("product_id").and_then(Value::as_i64))
        .collect();
    ids.sort();
    ids
}

// ============================================================================
// Bulk Writes
// ============================================================================

#[tokio::test]
async fn test_insert_all_in_batches_returns_generated_ids() {
    let (conn, shards) = create_db(10).await;

    let inserted = seed(&shards, 25).await;

    // 3 columns per row under a ceiling of 10 -> 3 rows per statement.
    assert_eq!(inserted.len(), 25);
    assert_eq!(ids(&inserted), (1..=25).collect::<Vec<_>>());
    assert!(conn.cache_stats().hits > 0);
}

#[tokio::test]
async fn test_delete_all_matches_null_columns() {
    let (_conn, shards) = create_db(100).await;
    let mut collection = Collection::new(products()).with_db(shards.clone());
    collection.set_rows(vec![
        row(json!({"name": "anvil", "brand": null, "price": 10})),
        row(json!({"name": "rope", "brand": "Acme", "price": 5})),
    ]);
    collection.insert_all().await.unwrap();

    let mut doomed = Collection::new(products()).with_db(shards.clone());
    doomed.set_rows(vec![
        row(json!({"name": "anvil", "brand": null})),
        row(json!({"name": "rope", "brand": "Acme"})),
    ]);
    assert_eq!(doomed.delete_all().await.unwrap(), 2);

    let mut remaining = Collection::new(products()).with_db(shards);
    assert!(remaining.populate(&QueryRequest::new()).await.unwrap().is_empty());
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_populate_splits_large_filter() {
    let (_conn, shards) = create_db(10).await;
    seed(&shards, 25).await;

    let mut collection = Collection::new(products()).with_db(shards);
    let request = QueryRequest::new()
        .filter("brand", ["Acme"])
        .filter("product_id", 1..=25_i64);
    let rows = collection.populate(&request).await.unwrap();

    // Acme is every third product starting with the first.
    assert_eq!(ids(rows), vec![1, 4, 7, 10, 13, 16, 19, 22, 25]);
}

#[tokio::test]
async fn test_modifiers_against_real_data() {
    let (_conn, shards) = create_db(1000).await;
    seed(&shards, 6).await;
    let mut collection = Collection::new(products()).with_db(shards);

    let rows = collection
        .populate(&QueryRequest::new().filter("i/brand", ["ACME", "globex"]))
        .await
        .unwrap();
    assert_eq!(rows.len(), 4);

    let rows = collection
        .populate(&QueryRequest::new().filter("~/brand", ["Acme", "Globex"]))
        .await
        .unwrap();
    assert_eq!(ids(rows), vec![3, 6]);
}

#[tokio::test]
async fn test_sorting_and_subset() {
    let (_conn, shards) = create_db(1000).await;
    seed(&shards, 10).await;
    let mut collection = Collection::new(products()).with_db(shards);

    let request = QueryRequest::new()
        .sort("price", SortDirection::Desc)
        .subset(Subset::new(3, 2).unwrap());
    let rows = collection.populate(&request).await.unwrap();

    let prices: Vec<_> = rows.iter().map(|r| r["price"].clone()).collect();
    assert_eq!(prices, vec![json!(800), json!(700), json!(600)]);
}

#[tokio::test]
async fn test_count_and_sum_projections() {
    let (_conn, shards) = create_db(1000).await;
    seed(&shards, 6).await;
    let mut collection = Collection::new(products()).with_db(shards);

    let rows = collection
        .populate(&QueryRequest::new().count("product_id", ["brand"]))
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["__count"] == json!(2)));

    let rows = collection
        .populate(&QueryRequest::new().filter("brand", ["Acme"]).sum("price", Vec::<String>::new()))
        .await
        .unwrap();
    // Acme holds products 1 and 4.
    assert_eq!(rows[0]["__sum"], json!(500));

    let rows = collection
        .populate(&QueryRequest::new().distinct(["brand"]))
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_request_from_json() {
    let (_conn, shards) = create_db(1000).await;
    seed(&shards, 9).await;
    let mut collection = Collection::new(products()).with_db(shards);

    let body = json!({
        "brand": ["Initech"],
        "__sorting": [["price", "ASC"]],
        "__subset": {"limit": 2, "offset": 1}
    });
    let rows = collection
        .populate(&QueryRequest::from_json(&body).unwrap())
        .await
        .unwrap();
    assert_eq!(ids(rows), vec![6, 9]);
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn test_rollback_discards_inserts() {
    let (conn, shards) = create_db(1000).await;

    begin_transaction(conn.as_ref()).await.unwrap();
    assert!(conn.in_transaction());
    seed(&shards, 3).await;
    rollback_transaction(conn.as_ref()).await.unwrap();
    assert!(!conn.in_transaction());

    let mut collection = Collection::new(products()).with_db(shards);
    assert!(collection.populate(&QueryRequest::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_keeps_inserts() {
    let (conn, shards) = create_db(1000).await;

    begin_transaction(conn.as_ref()).await.unwrap();
    seed(&shards, 3).await;
    commit_transaction(conn.as_ref()).await.unwrap();

    let mut collection = Collection::new(products()).with_db(shards);
    assert_eq!(collection.populate(&QueryRequest::new()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_row_locks_are_unsupported() {
    let (conn, shards) = create_db(1000).await;
    let mut collection = Collection::new(products()).with_db(shards);

    begin_transaction(conn.as_ref()).await.unwrap();
    let err = collection
        .populate(&QueryRequest::new().lock())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Request(RequestError::UnsupportedDirective { .. })
    ));

    let err = lock_table(conn.as_ref(), "products", TableLockMode::Exclusive)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Backend(BackendError::UnsupportedCapability { .. })
    ));
    rollback_transaction(conn.as_ref()).await.unwrap();
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Default)]
struct Product {
    id: Option<i64>,
    name: String,
    price: i64,
}

impl Entity for Product {
    fn descriptor() -> TableDescriptor {
        products()
    }

    fn id(&self) -> SqlParam {
        self.id.into()
    }

    fn set_id(&mut self, id: SqlParam) {
        if let SqlParam::Integer(i) = id {
            self.id = Some(i);
        }
    }

    fn columns(&self) -> Vec<(String, SqlParam)> {
        vec![
            ("name".to_string(), SqlParam::text(&self.name)),
            ("price".to_string(), SqlParam::Integer(self.price)),
        ]
    }

    fn merge(&mut self, row: &Row) -> StorageResult<()> {
        self.id = row.get("product_id").and_then(Value::as_i64);
        self.name = row
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.price = row.get("price").and_then(Value::as_i64).unwrap_or_default();
        Ok(())
    }
}

#[tokio::test]
async fn test_model_crud_round() {
    let (_conn, shards) = create_db(1000).await;
    let store = ModelStore::new(shards);

    let mut product = Product {
        id: None,
        name: "anvil".to_string(),
        price: 1250,
    };
    store.create(&mut product).await.unwrap();
    assert_eq!(product.id, Some(1));

    product.price = 999;
    store.update(&mut product).await.unwrap();

    let mut loaded = Product {
        id: Some(1),
        ..Default::default()
    };
    store.read(&mut loaded).await.unwrap();
    assert_eq!(loaded.name, "anvil");
    assert_eq!(loaded.price, 999);

    assert_eq!(store.delete(&loaded).await.unwrap(), 1);
    assert!(matches!(
        store.read(&mut loaded).await,
        Err(StorageError::NotFound(_))
    ));
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_shards_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("archive.db");
    let source = format!(
        r#"
        [database]
        shards = ["archive"]

        [database.routes]
        __DEFAULT__ = "archive"

        [database_shards.archive]
        driver = "sqlite"
        path = "{}"
        param_limit = 6
        "#,
        db_path.display()
    );
    let config = DatabaseConfig::from_toml_str(&source).unwrap();
    let shards = Arc::new(build_shard_manager(&config).unwrap());

    let conn = shards.fetch(DEFAULT_ROUTE).unwrap();
    assert_eq!(conn.param_limit(), ParamLimit::Max(6));
    conn.connect().await.unwrap();
    conn.execute(&BoundStatement::new(SCHEMA, BoundParams::new()))
        .await
        .unwrap();

    let inserted = seed(&shards, 7).await;
    assert_eq!(inserted.len(), 7);

    shards.disconnect_all().await.unwrap();
    assert!(!conn.is_connected());
    assert!(db_path.exists());
}

//! Collection integration tests.
//!
//! These tests drive [`Collection`] through a recording mock connection and
//! check the statements it issues: batching, validation before execution,
//! bulk writes and hooks.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{MockConnection, products, row, shards_with, wide_rows};
use tessera_persistence::collection::{Collection, CollectionHooks};
use tessera_persistence::core::{Connection, ShardManager, begin_transaction};
use tessera_persistence::dialect::DialectKind;
use tessera_persistence::error::{
    BackendError, BatchError, PreconditionError, RequestError, StorageError,
};
use tessera_persistence::query::{QueryRequest, SortDirection, SqlParam, Subset, WriteMode};
use tessera_persistence::types::{Row, TableDescriptor};

fn collection(conn: &Arc<MockConnection>) -> Collection {
    Collection::new(products()).with_db(shards_with(conn.clone()))
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_populate_connects_lazily_and_stores_rows() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres));
    conn.push_rows(vec![row(json!({"product_id": 1, "name": "anvil"}))]);
    let mut products = collection(&conn);

    let rows = products
        .populate(&QueryRequest::new().filter("product_id", [1]))
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(conn.connects(), 1);
    assert_eq!(products.rows()[0]["name"], json!("anvil"));
    assert_eq!(
        conn.statements()[0].sql(),
        "SELECT * FROM \"products\" WHERE \"product_id\" IN (:product_id_0) AND 1=1 "
    );
}

#[tokio::test]
async fn test_populate_without_database() {
    let mut orphan = Collection::new(products());
    let err = orphan.populate(&QueryRequest::new()).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Precondition(PreconditionError::NoDatabase)
    ));
}

#[tokio::test]
async fn test_oversized_filter_is_split_in_order() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(2000));
    conn.push_rows(vec![row(json!({"product_id": 0}))]);
    conn.push_rows(vec![row(json!({"product_id": 2000}))]);
    conn.push_rows(vec![row(json!({"product_id": 4000}))]);
    let mut products = collection(&conn);

    let request = QueryRequest::new().filter("product_id", 0..5000_i64);
    let rows = products.populate(&request).await.unwrap();

    let statements = conn.statements();
    let sizes: Vec<usize> = statements.iter().map(|s| s.params().len()).collect();
    assert_eq!(sizes, vec![2000, 2000, 1000]);
    assert_eq!(
        statements[1].params().get(":product_id_0"),
        Some(&SqlParam::Integer(2000))
    );
    assert_eq!(
        statements[2].params().get(":product_id_999"),
        Some(&SqlParam::Integer(4999))
    );

    let ids: Vec<_> = rows.iter().map(|r| r["product_id"].clone()).collect();
    assert_eq!(ids, vec![json!(0), json!(2000), json!(4000)]);
}

#[tokio::test]
async fn test_single_valued_filters_repeat_in_every_batch() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(10));
    let mut products = collection(&conn);

    let request = QueryRequest::new()
        .filter("status", ["active"])
        .filter("product_id", 0..20_i64);
    products.populate(&request).await.unwrap();

    let statements = conn.statements();
    assert_eq!(statements.len(), 3);
    for statement in &statements {
        assert!(statement.params().len() <= 10);
        assert_eq!(
            statement.params().get(":status_0"),
            Some(&SqlParam::text("active"))
        );
    }
}

#[tokio::test]
async fn test_two_multi_valued_filters_fail_before_execution() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(100));
    let mut products = collection(&conn);

    let request = QueryRequest::new()
        .filter("product_id", 0..80_i64)
        .filter("brand_id", 0..80_i64);
    let err = products.populate(&request).await.unwrap_err();

    assert!(matches!(
        err,
        StorageError::Batch(BatchError::MultipleSplitColumns { .. })
    ));
    assert!(conn.statements().is_empty());
    assert_eq!(conn.connects(), 0);
}

#[tokio::test]
async fn test_subset_applies_per_batch() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(5));
    let products = collection(&conn);

    let request = QueryRequest::new()
        .filter("product_id", 0..12_i64)
        .sort("name", SortDirection::Asc)
        .subset(Subset::new(3, 0).unwrap());
    let statements = products.plan_select(conn.as_ref(), &request).unwrap();

    assert_eq!(statements.len(), 3);
    for statement in &statements {
        assert!(
            statement
                .sql()
                .ends_with("ORDER BY \"name\" ASC LIMIT 3 OFFSET 0 "),
            "unexpected sql: {}",
            statement.sql()
        );
    }
}

#[tokio::test]
async fn test_unlisted_sort_column_is_rejected() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres));
    let mut products = collection(&conn);

    let request = QueryRequest::new().sort("secret", SortDirection::Desc);
    let err = products.populate(&request).await.unwrap_err();

    assert!(matches!(
        err,
        StorageError::Request(RequestError::InvalidSorting { .. })
    ));
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn test_lock_requires_transaction() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres));
    let mut products = collection(&conn);
    let request = QueryRequest::new().filter("product_id", [7]).lock();

    let err = products.populate(&request).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Precondition(PreconditionError::LockOutsideTransaction { .. })
    ));

    begin_transaction(conn.as_ref()).await.unwrap();
    products.populate(&request).await.unwrap();
    assert!(conn.statements()[0].sql().ends_with("FOR UPDATE "));
}

#[tokio::test]
async fn test_route_falls_back_to_default() {
    let main = Arc::new(MockConnection::new(DialectKind::Postgres));
    let archive = Arc::new(MockConnection::new(DialectKind::Sqlite));
    let shards = ShardManager::new();
    shards.attach("__DEFAULT__", main.clone()).unwrap();
    shards.attach("archive", archive.clone()).unwrap();
    let shards = Arc::new(shards);

    let mut archived = Collection::new(products())
        .with_db(shards.clone())
        .with_route("archive");
    archived.populate(&QueryRequest::new()).await.unwrap();

    let mut reports = Collection::new(products())
        .with_db(shards)
        .with_route("reports");
    reports.populate(&QueryRequest::new()).await.unwrap();

    assert_eq!(archive.statements().len(), 1);
    assert_eq!(main.statements().len(), 1);
}

// ============================================================================
// Writes
// ============================================================================

#[tokio::test]
async fn test_insert_all_splits_by_row_width() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(2000));
    let mut wide = Collection::new(TableDescriptor::new("wide")).with_db(shards_with(conn.clone()));
    wide.set_rows(wide_rows(10, 300));
    conn.push_rows(wide_rows(6, 300));
    conn.push_rows(wide_rows(4, 300));

    let inserted = wide.insert_all().await.unwrap();
    assert_eq!(inserted.len(), 10);

    let statements = conn.statements();
    let sizes: Vec<usize> = statements.iter().map(|s| s.params().len()).collect();
    assert_eq!(sizes, vec![1800, 1200]);
    assert!(statements[0].sql().starts_with("INSERT INTO \"wide\" (\"c0\", \"c1\""));
    assert!(statements[0].sql().ends_with(" RETURNING *"));
}

#[tokio::test]
async fn test_insert_all_replaces_rows_with_returned_rows() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres));
    let mut products = collection(&conn);
    products.push(row(json!({"name": "anvil", "price": 10})));
    conn.push_rows(vec![row(json!({"product_id": 41, "name": "anvil", "price": 10}))]);

    products.insert_all().await.unwrap();

    assert_eq!(products.rows()[0]["product_id"], json!(41));
    assert_eq!(
        conn.statements()[0].sql(),
        "INSERT INTO \"products\" (\"name\", \"price\") VALUES (:name_token_0, :price_token_0) RETURNING *"
    );
}

#[tokio::test]
async fn test_insert_all_with_no_rows_is_a_no_op() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres));
    let mut products = collection(&conn);
    assert!(products.insert_all().await.unwrap().is_empty());
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn test_insert_all_rejects_mismatched_rows() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres));
    let mut products = collection(&conn);
    products
        .push(row(json!({"name": "anvil", "price": 10})))
        .push(row(json!({"name": "rope"})));

    let err = products.insert_all().await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Request(RequestError::InconsistentColumns { index: 1 })
    ));
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn test_row_wider_than_limit() {
    let conn = Arc::new(MockConnection::new(DialectKind::SqlServer).with_param_limit(4));
    let mut wide = Collection::new(TableDescriptor::new("wide")).with_db(shards_with(conn.clone()));
    wide.set_rows(wide_rows(2, 5));

    let err = wide.insert_all().await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Batch(BatchError::RowTooWide { columns: 5, limit: 4 })
    ));
}

#[tokio::test]
async fn test_delete_all_sums_affected_rows() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(4));
    let mut products = collection(&conn);
    products.set_rows(vec![
        row(json!({"name": "anvil", "price": 10})),
        row(json!({"name": "rope", "price": null})),
        row(json!({"name": "tnt", "price": 99})),
    ]);
    conn.push_affected(2);
    conn.push_affected(1);

    let deleted = products.delete_all().await.unwrap();

    assert_eq!(deleted, 3);
    assert_eq!(products.len(), 3);
    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[0].sql(),
        "DELETE FROM \"products\" WHERE (\"name\" = :name_token_0 AND \"price\" = :price_token_0) OR (\"name\" = :name_token_1 AND \"price\" IS NULL)"
    );
}

// ============================================================================
// Failing Batches
// ============================================================================

fn priced(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| row(json!({"name": format!("item-{}", i), "price": i * 10})))
        .collect()
}

fn is_engine_error(err: &StorageError) -> bool {
    matches!(err, StorageError::Backend(BackendError::Engine { .. }))
}

#[tokio::test]
async fn test_populate_aborts_on_failing_batch() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(2));
    conn.push_rows(vec![row(json!({"product_id": 0}))]);
    conn.fail_on(2);
    let mut products = collection(&conn);
    products.set_rows(priced(1));

    let err = products
        .populate(&QueryRequest::new().filter("product_id", 0..5_i64))
        .await
        .unwrap_err();

    assert!(is_engine_error(&err));
    assert_eq!(conn.statements().len(), 2);
    assert_eq!(products.rows(), priced(1).as_slice());
}

#[tokio::test]
async fn test_insert_all_aborts_on_failing_batch() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(4));
    conn.push_rows(priced(2));
    conn.fail_on(2);
    let mut products = collection(&conn);
    products.set_rows(priced(6));

    let err = products.insert_all().await.unwrap_err();

    assert!(is_engine_error(&err));
    assert_eq!(conn.statements().len(), 2);
    assert_eq!(products.rows(), priced(6).as_slice());
}

#[tokio::test]
async fn test_delete_all_aborts_on_failing_batch() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres).with_param_limit(4));
    conn.push_affected(2);
    conn.fail_on(2);
    let mut products = collection(&conn);
    products.set_rows(priced(5));

    let err = products.delete_all().await.unwrap_err();

    assert!(is_engine_error(&err));
    assert_eq!(conn.statements().len(), 2);
    assert_eq!(products.rows(), priced(5).as_slice());
}

// ============================================================================
// Hooks
// ============================================================================

#[derive(Debug)]
struct PriceHooks;

impl CollectionHooks for PriceHooks {
    fn format(&self, rows: &mut Vec<Row>) {
        for row in rows.iter_mut() {
            if let Some(cents) = row.get("price").and_then(|p| p.as_i64()) {
                row.insert("price_display".to_string(), json!(format!("${}.{:02}", cents / 100, cents % 100)));
            }
        }
    }

    fn prepare_elements(&self, mode: WriteMode, rows: &[Row]) -> Vec<Row> {
        match mode {
            WriteMode::Insert => rows
                .iter()
                .map(|r| {
                    let mut r = r.clone();
                    r.remove("price_display");
                    r
                })
                .collect(),
            WriteMode::Delete => rows.to_vec(),
        }
    }
}

#[tokio::test]
async fn test_hooks_format_reads_and_prepare_writes() {
    let conn = Arc::new(MockConnection::new(DialectKind::Postgres));
    let mut products = collection(&conn).with_hooks(Arc::new(PriceHooks));

    conn.push_rows(vec![row(json!({"name": "anvil", "price": 1250}))]);
    products.populate(&QueryRequest::new()).await.unwrap();
    assert_eq!(products.rows()[0]["price_display"], json!("$12.50"));

    conn.push_rows(vec![row(json!({"product_id": 1, "name": "anvil", "price": 1250}))]);
    products.insert_all().await.unwrap();
    let insert = &conn.statements()[1];
    assert!(!insert.sql().contains("price_display"));
    assert_eq!(products.rows()[0]["price_display"], json!("$12.50"));
}

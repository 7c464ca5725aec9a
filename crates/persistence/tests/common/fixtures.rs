//! Row and table fixtures.

use serde_json::{Map, Value, json};

use tessera_persistence::types::{Row, TableDescriptor};

/// Converts a JSON object literal into a row.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture row must be an object, got {}", other),
    }
}

/// `count` rows of `width` integer columns named `c0`, `c1`, ...
pub fn wide_rows(count: usize, width: usize) -> Vec<Row> {
    (0..count)
        .map(|r| {
            let mut map = Map::new();
            for c in 0..width {
                map.insert(format!("c{}", c), json!(r * width + c));
            }
            map
        })
        .collect()
}

/// The `products` table, sortable by name and price.
pub fn products() -> TableDescriptor {
    TableDescriptor::new("products")
        .with_id_column("product_id")
        .with_sort_columns(["name", "price"])
}

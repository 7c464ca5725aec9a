//! Named placeholder translation.
//!
//! Statements are built with `:name` placeholders; the PostgreSQL protocol
//! expects `$n`. Quoted literals, quoted identifiers and `::` casts are left
//! untouched. A name used twice maps to the same position.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{BackendError, RequestError, StorageResult};
use crate::query::BoundParams;

static TOKEN: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|::|:([A-Za-z_][A-Za-z0-9_]*)"#)
});

/// Rewrites `:name` placeholders to `$n`, where `n` is the 1-based position of
/// the name in `params`.
pub fn to_positional(sql: &str, params: &BoundParams) -> StorageResult<String> {
    let token = TOKEN.as_ref().map_err(|e| BackendError::Internal {
        backend_name: "postgres".to_string(),
        message: format!("invalid placeholder pattern: {}", e),
        source: None,
    })?;
    let positions: HashMap<&str, usize> = params
        .names()
        .enumerate()
        .map(|(index, name)| (name, index + 1))
        .collect();
    let mut unbound: Option<String> = None;

    let rewritten = token.replace_all(sql, |caps: &Captures<'_>| {
        let Some(name) = caps.get(1) else {
            return caps[0].to_string();
        };
        let placeholder = format!(":{}", name.as_str());
        match positions.get(placeholder.as_str()) {
            Some(position) => format!("${}", position),
            None => {
                unbound.get_or_insert(placeholder);
                caps[0].to_string()
            }
        }
    });

    match unbound {
        Some(name) => Err(RequestError::UnboundPlaceholder { name }.into()),
        None => Ok(rewritten.into_owned()),
    }
}

//! Typed query requests.
//!
//! A [`QueryRequest`] is an ordered list of filters plus optional directives
//! (sorting, subset, projection, lock). Requests can be assembled with the
//! builder methods or read from the JSON form used by HTTP callers:
//!
//! ```json
//! {
//!     "status": ["active", "pending"],
//!     "i/name": ["smith"],
//!     "__sorting": [["created_at", "DESC"]],
//!     "__subset": {"limit": 20, "offset": 40},
//!     "__count": {"__distinct": true, "columns": ["customer_id", "status"]},
//!     "__lock": true
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RequestError, StorageError, StorageResult};

use super::params::SqlParam;

/// Sorting directive key.
pub const SORTING_KEY: &str = "__sorting";
/// Subset directive key.
pub const SUBSET_KEY: &str = "__subset";
/// Distinct directive key.
pub const DISTINCT_KEY: &str = "__distinct";
/// Count directive key.
pub const COUNT_KEY: &str = "__count";
/// Sum directive key.
pub const SUM_KEY: &str = "__sum";
/// Lock directive key.
pub const LOCK_KEY: &str = "__lock";

/// Keys that are never interpreted as filters.
pub const RESERVED_KEYS: [&str; 6] = [
    SORTING_KEY,
    SUBSET_KEY,
    DISTINCT_KEY,
    COUNT_KEY,
    SUM_KEY,
    LOCK_KEY,
];

/// Whether `key` names a directive rather than a filter.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SortDirection {
    type Err = RequestError;

    /// Only the exact upper-case keywords are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            other => Err(RequestError::InvalidSorting {
                message: format!("direction must be ASC or DESC, got '{}'", other),
            }),
        }
    }
}

/// One `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Column name (unquoted).
    pub column: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Limit/offset pair. The limit is at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subset {
    limit: u64,
    offset: u64,
}

impl Subset {
    /// Creates a subset, rejecting a non-positive limit or a negative offset.
    pub fn new(limit: i64, offset: i64) -> StorageResult<Self> {
        if limit < 1 {
            return Err(RequestError::InvalidSubset {
                message: format!("limit must be a positive integer, got {}", limit),
            }
            .into());
        }
        if offset < 0 {
            return Err(RequestError::InvalidSubset {
                message: format!("offset must be a non-negative integer, got {}", offset),
            }
            .into());
        }
        Ok(Self {
            limit: limit as u64,
            offset: offset as u64,
        })
    }

    /// Maximum number of rows.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of rows skipped.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// What the `SELECT` clause projects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// `SELECT *`
    #[default]
    All,
    /// `SELECT DISTINCT "a", "b"`
    Distinct(Vec<String>),
    /// `SELECT COUNT("c") AS "__count", "g1", ...` grouped by the extra columns.
    Count {
        /// Counted column.
        column: String,
        /// Whether only distinct values are counted.
        distinct: bool,
        /// Columns the count is grouped by, possibly none.
        group_by: Vec<String>,
    },
    /// `SELECT SUM("c") AS "__sum", "g1", ...` grouped by the extra columns.
    Sum {
        /// Summed column.
        column: String,
        /// Columns the sum is grouped by, possibly none.
        group_by: Vec<String>,
    },
}

impl Projection {
    /// Grouping columns of an aggregate projection.
    pub fn group_by(&self) -> &[String] {
        match self {
            Projection::Count { group_by, .. } | Projection::Sum { group_by, .. } => group_by,
            Projection::All | Projection::Distinct(_) => &[],
        }
    }

    fn validate(&self) -> StorageResult<()> {
        let invalid = |directive: &str, message: &str| -> StorageError {
            RequestError::InvalidDirective {
                directive: directive.to_string(),
                message: message.to_string(),
            }
            .into()
        };
        match self {
            Projection::All => Ok(()),
            Projection::Distinct(columns) => {
                if columns.is_empty() || columns.iter().any(String::is_empty) {
                    return Err(invalid(DISTINCT_KEY, "non-empty column list expected"));
                }
                Ok(())
            }
            Projection::Count {
                column, group_by, ..
            } => {
                if column.is_empty() || group_by.iter().any(String::is_empty) {
                    return Err(invalid(COUNT_KEY, "non-empty column names expected"));
                }
                Ok(())
            }
            Projection::Sum { column, group_by } => {
                if column.is_empty() || group_by.iter().any(String::is_empty) {
                    return Err(invalid(SUM_KEY, "non-empty column names expected"));
                }
                Ok(())
            }
        }
    }
}

/// A filter key and its values.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Filter key, possibly carrying modifiers (`~i/name`).
    pub key: String,
    /// Values matched with `IN`/`NOT IN`.
    pub values: Vec<SqlParam>,
}

/// A structured query request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    filters: Vec<Filter>,
    projection: Projection,
    sorting: Vec<Sort>,
    subset: Option<Subset>,
    lock: bool,
}

impl QueryRequest {
    /// Creates an empty request (`SELECT * ... WHERE 1=1`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter. Setting the same key twice replaces its values in place.
    pub fn filter<K, I, V>(mut self, key: K, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<SqlParam>,
    {
        let key = key.into();
        let values: Vec<SqlParam> = values.into_iter().map(Into::into).collect();
        match self.filters.iter_mut().find(|f| f.key == key) {
            Some(existing) => existing.values = values,
            None => self.filters.push(Filter { key, values }),
        }
        self
    }

    /// Appends a sort entry.
    pub fn sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sorting.push(Sort {
            column: column.into(),
            direction,
        });
        self
    }

    /// Sets the subset.
    pub fn subset(mut self, subset: Subset) -> Self {
        self.subset = Some(subset);
        self
    }

    /// Projects distinct values of the given columns.
    pub fn distinct<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Projection::Distinct(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Counts `column`, grouped by `group_by`.
    pub fn count<I, S>(mut self, column: impl Into<String>, group_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Projection::Count {
            column: column.into(),
            distinct: false,
            group_by: group_by.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Counts distinct values of `column`, grouped by `group_by`.
    pub fn count_distinct<I, S>(mut self, column: impl Into<String>, group_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Projection::Count {
            column: column.into(),
            distinct: true,
            group_by: group_by.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Sums `column`, grouped by `group_by`.
    pub fn sum<I, S>(mut self, column: impl Into<String>, group_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Projection::Sum {
            column: column.into(),
            group_by: group_by.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Requests row locks on the selected rows.
    pub fn lock(mut self) -> Self {
        self.lock = true;
        self
    }

    /// Filters in insertion order.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The projection.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Sort entries in order.
    pub fn sorting(&self) -> &[Sort] {
        &self.sorting
    }

    /// The subset, if any.
    pub fn subset_spec(&self) -> Option<Subset> {
        self.subset
    }

    /// Whether row locks were requested.
    pub fn is_locking(&self) -> bool {
        self.lock
    }

    /// Number of parameters a single statement for this request binds.
    pub fn param_count(&self) -> usize {
        self.filters.iter().map(|f| f.values.len()).sum()
    }

    /// Returns a copy with the values of the filter at `index` replaced.
    ///
    /// Filter position and every directive are preserved.
    pub fn with_filter_values(&self, index: usize, values: Vec<SqlParam>) -> Self {
        let mut request = self.clone();
        if let Some(filter) = request.filters.get_mut(index) {
            filter.values = values;
        }
        request
    }

    /// Checks filters and projection for malformed data.
    pub fn validate(&self) -> StorageResult<()> {
        for filter in &self.filters {
            if is_reserved_key(&filter.key) {
                return Err(RequestError::ReservedFilterKey {
                    key: filter.key.clone(),
                }
                .into());
            }
            if filter.values.is_empty() {
                return Err(RequestError::EmptyFilter {
                    key: filter.key.clone(),
                }
                .into());
            }
            if let Some(index) = filter.values.iter().position(SqlParam::is_empty) {
                return Err(RequestError::EmptyFilterValue {
                    key: filter.key.clone(),
                    index,
                }
                .into());
            }
        }
        self.projection.validate()
    }

    /// Reads a request from its JSON object form.
    pub fn from_json(value: &Value) -> StorageResult<Self> {
        let object = value.as_object().ok_or(RequestError::NotAnObject)?;

        if object.contains_key(COUNT_KEY) && object.contains_key(SUM_KEY) {
            return Err(RequestError::CountAndSum.into());
        }

        let mut request = QueryRequest::new();

        for (key, value) in object {
            match key.as_str() {
                SORTING_KEY => request.sorting = parse_sorting(value)?,
                SUBSET_KEY => request.subset = Some(parse_subset(value)?),
                LOCK_KEY => request.lock = parse_lock(value)?,
                DISTINCT_KEY | COUNT_KEY | SUM_KEY => {}
                _ => request.filters.push(parse_filter(key, value)?),
            }
        }

        request.projection = if let Some(value) = object.get(DISTINCT_KEY) {
            Projection::Distinct(string_list(DISTINCT_KEY, value)?)
        } else if let Some(value) = object.get(COUNT_KEY) {
            parse_count(value)?
        } else if let Some(value) = object.get(SUM_KEY) {
            let mut columns = string_list(SUM_KEY, value)?;
            let column = columns.remove(0);
            Projection::Sum {
                column,
                group_by: columns,
            }
        } else {
            Projection::All
        };

        Ok(request)
    }
}

impl TryFrom<&Value> for QueryRequest {
    type Error = StorageError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        QueryRequest::from_json(value)
    }
}

fn parse_filter(key: &str, value: &Value) -> StorageResult<Filter> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| RequestError::EmptyFilter {
            key: key.to_string(),
        })?;

    let values = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            SqlParam::from_json(item).ok_or_else(|| {
                StorageError::from(RequestError::NonScalarFilterValue {
                    key: key.to_string(),
                    index,
                })
            })
        })
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(Filter {
        key: key.to_string(),
        values,
    })
}

fn parse_sorting(value: &Value) -> StorageResult<Vec<Sort>> {
    let invalid = |message: &str| -> StorageError {
        RequestError::InvalidSorting {
            message: message.to_string(),
        }
        .into()
    };

    let entries = value
        .as_array()
        .filter(|entries| !entries.is_empty())
        .ok_or_else(|| invalid("non-empty list of [column, direction] pairs expected"))?;

    entries
        .iter()
        .map(|entry| match entry.as_array().map(Vec::as_slice) {
            Some([Value::String(column), Value::String(direction)]) => Ok(Sort {
                column: column.clone(),
                direction: direction.parse()?,
            }),
            _ => Err(invalid("each entry must be a [column, direction] pair")),
        })
        .collect()
}

fn parse_subset(value: &Value) -> StorageResult<Subset> {
    let object = value.as_object().ok_or_else(|| RequestError::InvalidSubset {
        message: "object with limit and offset expected".to_string(),
    })?;
    let field = |name: &str| -> StorageResult<i64> {
        object.get(name).and_then(Value::as_i64).ok_or_else(|| {
            RequestError::InvalidSubset {
                message: format!("integer {} expected", name),
            }
            .into()
        })
    };
    Subset::new(field("limit")?, field("offset")?)
}

fn parse_lock(value: &Value) -> StorageResult<bool> {
    value.as_bool().ok_or_else(|| {
        RequestError::InvalidDirective {
            directive: LOCK_KEY.to_string(),
            message: "boolean expected".to_string(),
        }
        .into()
    })
}

fn parse_count(value: &Value) -> StorageResult<Projection> {
    let (distinct, columns) = match value {
        Value::Object(object) => {
            let distinct = object
                .get(DISTINCT_KEY)
                .map(|flag| flag.as_bool().unwrap_or(true))
                .unwrap_or(false);
            let columns = object.get("columns").unwrap_or(&Value::Null);
            (distinct, string_list(COUNT_KEY, columns)?)
        }
        other => (false, string_list(COUNT_KEY, other)?),
    };

    let mut columns = columns;
    let column = columns.remove(0);
    Ok(Projection::Count {
        column,
        distinct,
        group_by: columns,
    })
}

// Non-empty list of strings; the first element is guaranteed to exist.
fn string_list(directive: &str, value: &Value) -> StorageResult<Vec<String>> {
    let invalid = || -> StorageError {
        RequestError::InvalidDirective {
            directive: directive.to_string(),
            message: "non-empty list of column names expected".to_string(),
        }
        .into()
    };
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(invalid)?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

impl QueryRequest {
    /// Renders the request back into its JSON object form, the inverse of
    /// [`QueryRequest::from_json`].
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for filter in &self.filters {
            object.insert(
                filter.key.clone(),
                Value::Array(filter.values.iter().map(SqlParam::to_json).collect()),
            );
        }
        match &self.projection {
            Projection::All => {}
            Projection::Distinct(columns) => {
                object.insert(DISTINCT_KEY.to_string(), Value::from(columns.clone()));
            }
            Projection::Count {
                column,
                distinct,
                group_by,
            } => {
                let columns: Vec<String> = std::iter::once(column.clone())
                    .chain(group_by.iter().cloned())
                    .collect();
                let value = if *distinct {
                    serde_json::json!({ DISTINCT_KEY: true, "columns": columns })
                } else {
                    Value::from(columns)
                };
                object.insert(COUNT_KEY.to_string(), value);
            }
            Projection::Sum { column, group_by } => {
                let columns: Vec<String> = std::iter::once(column.clone())
                    .chain(group_by.iter().cloned())
                    .collect();
                object.insert(SUM_KEY.to_string(), Value::from(columns));
            }
        }
        if !self.sorting.is_empty() {
            object.insert(
                SORTING_KEY.to_string(),
                Value::Array(
                    self.sorting
                        .iter()
                        .map(|s| serde_json::json!([s.column, s.direction.as_sql()]))
                        .collect(),
                ),
            );
        }
        if let Some(subset) = self.subset {
            object.insert(
                SUBSET_KEY.to_string(),
                serde_json::json!({"limit": subset.limit, "offset": subset.offset}),
            );
        }
        if self.lock {
            object.insert(LOCK_KEY.to_string(), Value::Bool(true));
        }
        Value::Object(object)
    }
}

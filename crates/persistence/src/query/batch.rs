//! Splitting requests that exceed a parameter ceiling.
//!
//! A request can be split only when exactly one filter carries more than one
//! value. That filter's values are cut into consecutive chunks sized so that
//! each chunk plus the single-valued filters fits under the ceiling:
//!
//! ```text
//! chunk_size = limit - fixed_filters
//! batches    = ceil(values / chunk_size)
//! ```
//!
//! Bulk writes use the row equivalent: `floor(limit / columns_per_row)` rows
//! per statement.

use crate::error::{BatchError, StorageResult};

use super::params::SqlParam;
use super::request::QueryRequest;

/// How an oversized request is split.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    split_index: usize,
    split_key: String,
    fixed_filters: usize,
    chunk_size: usize,
    chunks: Vec<Vec<SqlParam>>,
}

impl BatchPlan {
    /// Plans the split of `request` under a ceiling of `limit` parameters.
    pub fn plan(request: &QueryRequest, limit: usize) -> StorageResult<Self> {
        let (multi, single): (Vec<_>, Vec<_>) = request
            .filters()
            .iter()
            .enumerate()
            .partition(|(_, f)| f.values.len() > 1);

        if multi.len() > 1 {
            return Err(BatchError::MultipleSplitColumns {
                columns: multi.iter().map(|(_, f)| f.key.clone()).collect(),
            }
            .into());
        }

        let Some(&(split_index, split)) = multi.first() else {
            return Err(BatchError::NoSplitColumn {
                params: request.param_count(),
                limit,
            }
            .into());
        };

        let fixed_filters = single.len();
        let chunk_size = limit.saturating_sub(fixed_filters);
        if chunk_size == 0 {
            return Err(BatchError::ChunkSizeExhausted {
                fixed: fixed_filters,
                limit,
            }
            .into());
        }

        let chunks = split
            .values
            .chunks(chunk_size)
            .map(<[SqlParam]>::to_vec)
            .collect();

        Ok(Self {
            split_index,
            split_key: split.key.clone(),
            fixed_filters,
            chunk_size,
            chunks,
        })
    }

    /// Key of the filter being split.
    pub fn split_key(&self) -> &str {
        &self.split_key
    }

    /// Number of single-valued filters repeated in every chunk.
    pub fn fixed_filters(&self) -> usize {
        self.fixed_filters
    }

    /// Maximum number of split values per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of statements the plan issues.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the plan issues no statements.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sizes of the chunks in order.
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.iter().map(Vec::len).collect()
    }

    /// One request per chunk, in chunk order. Directives are copied unchanged.
    pub fn sub_requests<'a>(
        &'a self,
        request: &'a QueryRequest,
    ) -> impl Iterator<Item = QueryRequest> + 'a {
        self.chunks
            .iter()
            .map(move |chunk| request.with_filter_values(self.split_index, chunk.clone()))
    }
}

/// Rows per statement for bulk writes of `columns_per_row` columns.
pub fn rows_per_batch(limit: usize, columns_per_row: usize) -> StorageResult<usize> {
    let rows = limit.checked_div(columns_per_row).unwrap_or(0);
    if rows == 0 {
        return Err(BatchError::RowTooWide {
            columns: columns_per_row,
            limit,
        }
        .into());
    }
    Ok(rows)
}

//! `SELECT` statement sequencing.
//!
//! Clauses are always emitted in this order:
//!
//! 1. dialect prepend segment
//! 2. `SELECT` projection (`DISTINCT`, `COUNT`, `SUM` or `*`)
//! 3. `FROM "table" WHERE`
//! 4. one `column IN (...) AND` per filter
//! 5. `1=1`
//! 6. `GROUP BY` for aggregates with group columns
//! 7. `ORDER BY`
//! 8. subset
//! 9. lock
//!
//! Every check runs before any text is produced, so a rejected request never
//! reaches the connection.

use crate::dialect::{Dialect, LockSyntax};
use crate::error::{PreconditionError, RequestError, StorageResult};
use crate::types::TableDescriptor;

use super::filter::parse_filter_key;
use super::params::BoundParams;
use super::request::{Projection, QueryRequest, Sort};
use super::statement::BoundStatement;

/// Alias of the `COUNT` projection.
pub const COUNT_ALIAS: &str = "__count";
/// Alias of the `SUM` projection.
pub const SUM_ALIAS: &str = "__sum";

/// Builds `SELECT` statements for one table in one dialect.
#[derive(Debug, Clone, Copy)]
pub struct SelectBuilder<'a> {
    dialect: &'a dyn Dialect,
    descriptor: &'a TableDescriptor,
}

impl<'a> SelectBuilder<'a> {
    /// Creates a builder.
    pub fn new(dialect: &'a dyn Dialect, descriptor: &'a TableDescriptor) -> Self {
        Self {
            dialect,
            descriptor,
        }
    }

    /// Builds the statement for `request`.
    ///
    /// `in_transaction` must report whether the target connection is connected
    /// and inside a transaction; lock directives are refused otherwise.
    pub fn build(
        &self,
        request: &QueryRequest,
        in_transaction: bool,
    ) -> StorageResult<BoundStatement> {
        let lock = self.check(request, in_transaction)?;

        let mut sql = self.dialect.prepend(request);
        let mut params = BoundParams::with_capacity(request.param_count());

        self.select_clause(&mut sql, request.projection());
        self.from_clause(&mut sql, lock);
        self.attach_filters(&mut sql, &mut params, request)?;
        sql.push_str("1=1 ");
        self.grouping_clause(&mut sql, request.projection());
        self.sorting_clause(&mut sql, request.sorting());

        if let Some(subset) = request.subset_spec() {
            sql.push_str(
                &self
                    .dialect
                    .subset_clause(subset, !request.sorting().is_empty()),
            );
        }

        if let Some(LockSyntax::Trailing(clause)) = lock {
            sql.push_str(clause);
        }

        Ok(BoundStatement::new(sql, params))
    }

    /// Runs every check [`build`](Self::build) runs without producing SQL.
    ///
    /// Returns the lock syntax to apply when the request locks rows.
    pub fn check(
        &self,
        request: &QueryRequest,
        in_transaction: bool,
    ) -> StorageResult<Option<LockSyntax>> {
        if request.is_locking() && !in_transaction {
            return Err(PreconditionError::LockOutsideTransaction {
                table: self.descriptor.table().to_string(),
            }
            .into());
        }
        self.check_sorting(request.sorting())?;
        request.validate()?;

        if request.is_locking() {
            Ok(Some(self.dialect.lock_syntax()?))
        } else {
            Ok(None)
        }
    }

    fn check_sorting(&self, sorting: &[Sort]) -> StorageResult<()> {
        for sort in sorting {
            if !self.descriptor.is_sortable(&sort.column) {
                return Err(RequestError::InvalidSorting {
                    message: format!(
                        "column '{}' is not sortable on {}",
                        sort.column,
                        self.descriptor.table()
                    ),
                }
                .into());
            }
        }
        Ok(())
    }

    fn quote_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn select_clause(&self, sql: &mut String, projection: &Projection) {
        sql.push_str("SELECT ");
        match projection {
            Projection::All => sql.push_str("* "),
            Projection::Distinct(columns) => {
                sql.push_str("DISTINCT ");
                sql.push_str(&self.quote_list(columns));
                sql.push(' ');
            }
            Projection::Count {
                column,
                distinct,
                group_by,
            } => {
                sql.push_str(&format!(
                    "COUNT({}{}) AS {} ",
                    if *distinct { "DISTINCT " } else { "" },
                    self.dialect.quote_identifier(column),
                    self.dialect.quote_identifier(COUNT_ALIAS)
                ));
                self.extra_columns(sql, group_by);
            }
            Projection::Sum { column, group_by } => {
                sql.push_str(&format!(
                    "SUM({}) AS {} ",
                    self.dialect.quote_identifier(column),
                    self.dialect.quote_identifier(SUM_ALIAS)
                ));
                self.extra_columns(sql, group_by);
            }
        }
    }

    fn extra_columns(&self, sql: &mut String, group_by: &[String]) {
        if !group_by.is_empty() {
            sql.push_str(", ");
            sql.push_str(&self.quote_list(group_by));
            sql.push(' ');
        }
    }

    fn from_clause(&self, sql: &mut String, lock: Option<LockSyntax>) {
        sql.push_str("FROM ");
        sql.push_str(&self.dialect.quote_identifier(self.descriptor.table()));
        if let Some(LockSyntax::TableHint(hint)) = lock {
            sql.push(' ');
            sql.push_str(hint);
        }
        sql.push_str(" WHERE ");
    }

    fn attach_filters(
        &self,
        sql: &mut String,
        params: &mut BoundParams,
        request: &QueryRequest,
    ) -> StorageResult<()> {
        for filter in request.filters() {
            let parsed = parse_filter_key(&filter.key, self.dialect);
            let mut placeholders = Vec::with_capacity(filter.values.len());
            for (index, value) in filter.values.iter().enumerate() {
                params.bind(parsed.bind_name(index), value.clone())?;
                placeholders.push(parsed.placeholder(index));
            }
            sql.push_str(&format!(
                "{} {} ({}) AND ",
                parsed.column,
                parsed.operator,
                placeholders.join(", ")
            ));
        }
        Ok(())
    }

    fn grouping_clause(&self, sql: &mut String, projection: &Projection) {
        let group_by = projection.group_by();
        if !group_by.is_empty() {
            sql.push_str("GROUP BY ");
            sql.push_str(&self.quote_list(group_by));
            sql.push(' ');
        }
    }

    fn sorting_clause(&self, sql: &mut String, sorting: &[Sort]) {
        if sorting.is_empty() {
            return;
        }
        let entries: Vec<String> = sorting
            .iter()
            .map(|s| {
                format!(
                    "{} {}",
                    self.dialect.quote_identifier(&s.column),
                    s.direction
                )
            })
            .collect();
        sql.push_str("ORDER BY ");
        sql.push_str(&entries.join(", "));
        sql.push(' ');
    }
}

//! Static table descriptions.
//!
//! Entities and collections describe their table up front instead of
//! discovering columns at runtime: table name, identifier column, and the
//! columns callers may sort by.

/// Describes the table behind a collection or entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    table: String,
    id_column: String,
    sort_columns: Vec<String>,
}

impl TableDescriptor {
    /// Describes `table` with an `id` identifier column and no sortable columns.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_column: "id".to_string(),
            sort_columns: Vec::new(),
        }
    }

    /// Sets the identifier column.
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Sets the columns allowed in sorting directives.
    pub fn with_sort_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Table name (unquoted).
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Identifier column (unquoted).
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Sortable columns in declaration order.
    pub fn sort_columns(&self) -> &[String] {
        &self.sort_columns
    }

    /// Whether `column` may appear in a sorting directive.
    pub fn is_sortable(&self, column: &str) -> bool {
        self.sort_columns.iter().any(|c| c == column)
    }
}

//! Filter key parsing.
//!
//! A filter key is either a bare column name (`status`) or a modifier string
//! followed by a slash and the column name (`~i/status`). Modifiers fold into
//! the parsed result left to right:
//!
//! | Modifier | Effect |
//! |----------|--------|
//! | `~` | `IN` becomes `NOT IN`, bind prefix gains `exclude_` |
//! | `i` | column and every placeholder are case-folded, bind prefix gains `case_insensitive_` |
//!
//! Unknown modifier characters are ignored.

use std::fmt;

use crate::dialect::Dialect;

/// Comparison operator of a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
}

impl FilterOperator {
    /// SQL keyword(s) for this operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single modifier character of a filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterModifier {
    /// `~`
    Negate,
    /// `i`
    CaseInsensitive,
}

impl FilterModifier {
    /// Parses a modifier character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '~' => Some(FilterModifier::Negate),
            'i' => Some(FilterModifier::CaseInsensitive),
            _ => None,
        }
    }
}

/// The parsed form of a filter key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilter {
    /// Column SQL fragment, possibly wrapped in a case-fold function.
    pub column: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Placeholder name prefix, including the leading `:`.
    pub bind_prefix: String,
    /// Text placed before each placeholder.
    pub value_prefix: String,
    /// Text placed after each placeholder.
    pub value_suffix: String,
}

impl ParsedFilter {
    /// Bind name of the value at `index`.
    pub fn bind_name(&self, index: usize) -> String {
        format!("{}{}", self.bind_prefix, index)
    }

    /// Placeholder SQL of the value at `index`, including value wrapping.
    pub fn placeholder(&self, index: usize) -> String {
        format!(
            "{}{}{}",
            self.value_prefix,
            self.bind_name(index),
            self.value_suffix
        )
    }

    fn apply(&mut self, modifier: FilterModifier, dialect: &dyn Dialect) {
        match modifier {
            FilterModifier::Negate => {
                self.operator = FilterOperator::NotIn;
                self.bind_prefix.push_str("exclude_");
            }
            FilterModifier::CaseInsensitive => {
                let fold = dialect.case_fold_function();
                self.column = format!("{}({})", fold, self.column);
                self.bind_prefix.push_str("case_insensitive_");
                self.value_prefix = format!("{}({}", fold, self.value_prefix);
                self.value_suffix.push(')');
            }
        }
    }
}

/// Parses a filter key into its column, operator and placeholder decoration.
///
/// Pure and deterministic; the dialect only supplies quoting and the case-fold
/// function.
pub fn parse_filter_key(key: &str, dialect: &dyn Dialect) -> ParsedFilter {
    let (modifiers, column) = match key.split_once('/') {
        Some((modifiers, column)) => (modifiers, column),
        None => ("", key),
    };

    let mut parsed = ParsedFilter {
        column: dialect.quote_identifier(column),
        operator: FilterOperator::In,
        bind_prefix: format!(":{}_", bind_safe(column)),
        value_prefix: String::new(),
        value_suffix: String::new(),
    };

    for modifier in modifiers.chars().filter_map(FilterModifier::from_char) {
        parsed.apply(modifier, dialect);
    }

    parsed
}

// Placeholder names may only contain word characters. Anything else is
// written as `_x<hex>_` so `a-b` and `a_b` keep distinct prefixes.
pub(crate) fn bind_safe(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    for c in column.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push_str(&format!("_x{:x}_", u32::from(c)));
        }
    }
    out
}

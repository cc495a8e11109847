//! Structural queries over catalog rows.
//!
//! A [`Query`] constrains a subset of the schema columns. Fuzzy matching
//! treats unspecified columns as unconstrained; exact matching demands
//! scalar equality across every provided key. Both modes are read-only.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::{is_known_column, Entry};
use crate::error::{CatalogError, Result};

/// One query constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// The column's canonical text must equal this value.
    Eq(String),
    /// The column's canonical text must equal one of these values.
    AnyOf(Vec<String>),
}

impl QueryValue {
    /// Returns true if the given column text satisfies this constraint.
    #[must_use]
    pub fn accepts(&self, text: Option<&str>) -> bool {
        match self {
            Self::Eq(value) => text == Some(value.as_str()),
            Self::AnyOf(values) => text.is_some_and(|t| values.iter().any(|v| v == t)),
        }
    }

    /// Returns true if this constraint is a list of allowed values.
    #[must_use]
    pub const fn is_any_of(&self) -> bool {
        matches!(self, Self::AnyOf(_))
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Eq(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Eq(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        Self::AnyOf(values)
    }
}

impl From<Vec<&str>> for QueryValue {
    fn from(values: Vec<&str>) -> Self {
        Self::AnyOf(values.into_iter().map(ToString::to_string).collect())
    }
}

/// A partial-field query over catalog rows.
///
/// Field order is preserved so merged queries render predictably in logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query {
    fields: IndexMap<String, QueryValue>,
}

impl Query {
    /// Creates an empty query. An empty query matches every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint, replacing any existing constraint on the column.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Adds a constraint in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<QueryValue>) {
        self.fields.insert(column.into(), value.into());
    }

    /// Returns the constraint on a column, if any.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&QueryValue> {
        self.fields.get(column)
    }

    /// Returns true if no columns are constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates the constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns this query overlaid with another; the other query's
    /// constraints win on shared columns.
    #[must_use]
    pub fn merged_with(&self, overrides: &Self) -> Self {
        let mut merged = self.clone();
        for (column, value) in &overrides.fields {
            merged.fields.insert(column.clone(), value.clone());
        }
        merged
    }

    /// Parses a query from a JSON object of column to value, where a value
    /// is a string or a list of strings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` on any other shape.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| CatalogError::InvalidQuery {
            message: format!("expected an object, got {value}"),
        })?;
        let mut query = Self::new();
        for (column, raw) in object {
            let constraint = match raw {
                Value::String(s) => QueryValue::Eq(s.clone()),
                Value::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        let s = item.as_str().ok_or_else(|| CatalogError::InvalidQuery {
                            message: format!("non-string element in list for column {column}"),
                        })?;
                        values.push(s.to_string());
                    }
                    QueryValue::AnyOf(values)
                }
                other => {
                    return Err(CatalogError::InvalidQuery {
                        message: format!("unsupported value for column {column}: {other}"),
                    })
                }
            };
            query.fields.insert(column.clone(), constraint);
        }
        Ok(query)
    }

    /// Checks that every constrained column is part of the schema.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` for the first unknown column.
    pub fn validate_columns(&self) -> Result<()> {
        for column in self.fields.keys() {
            if !is_known_column(column) {
                return Err(CatalogError::UnknownColumn {
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns true if the entry satisfies every constraint.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        self.fields
            .iter()
            .all(|(column, constraint)| constraint.accepts(entry.column_text(column).as_deref()))
    }
}

/// How strictly a query is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Subset match: specified columns must equal, the rest are free.
    #[default]
    Fuzzy,
    /// Scalar equality across all provided keys simultaneously. List
    /// constraints are rejected in this mode.
    Exact,
}

/// Returns the rows satisfying the query, in row order.
///
/// # Errors
///
/// Returns `UnknownColumn` for constraints outside the schema and
/// `InvalidQuery` for list constraints in exact mode.
pub fn match_rows<'a>(rows: &'a [Entry], query: &Query, mode: MatchMode) -> Result<Vec<&'a Entry>> {
    query.validate_columns()?;
    if mode == MatchMode::Exact {
        if let Some((column, _)) = query.iter().find(|(_, v)| v.is_any_of()) {
            return Err(CatalogError::InvalidQuery {
                message: format!("exact match requires a scalar for column {column}"),
            });
        }
    }
    Ok(rows.iter().filter(|row| query.matches(row)).collect())
}

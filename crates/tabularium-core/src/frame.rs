//! A minimal ordered-column tabular value.
//!
//! `Frame` is the shape that crosses the table-I/O boundary. The catalog
//! core never computes on cell values; it only serializes, hashes, and
//! column-filters frames. Anything numeric happens in downstream stages
//! that consume materialized frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};

/// An ordered-column table with row-major cells.
///
/// Cells are JSON values so frames round-trip through any byte-level
/// backend without a schema registry. Column order is significant and is
/// preserved through serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Creates a frame from columns and row-major cells.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if any row's width differs from the
    /// column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::InvalidInput(format!(
                    "row {index} has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Creates an empty frame with the given columns.
    #[must_use]
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Returns the ordered column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the row-major cells.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns the position of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns a new frame containing only the named columns, in the order
    /// given.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if any requested column does not exist.
    pub fn select(&self, keep: &[String]) -> Result<Self> {
        let mut indices = Vec::with_capacity(keep.len());
        for name in keep {
            let index = self
                .column_index(name)
                .ok_or_else(|| Error::InvalidInput(format!("no such column: {name}")))?;
            indices.push(index);
        }

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(Self {
            columns: keep.to_vec(),
            rows,
        })
    }

    /// Returns a new frame truncated to at most `limit` rows.
    #[must_use]
    pub fn head(&self, limit: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
        }
    }

    /// Computes the provenance hash of this frame's cell values.
    ///
    /// The hash is a wrapping sum of per-cell hashes, so it is invariant
    /// under row reordering. It identifies what was dumped, not where; two
    /// catalog entries with different semantic identities may legitimately
    /// carry the same hash.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        self.rows
            .iter()
            .flatten()
            .map(|cell| xxh3_64(cell.to_string().as_bytes()))
            .fold(0u64, u64::wrapping_add)
    }
}

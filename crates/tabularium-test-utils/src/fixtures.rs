//! Pre-built test fixtures for common test scenarios.
//!
//! Provides factory functions to create test data with sensible defaults.

use std::sync::Arc;

use serde_json::json;

use tabularium_catalog::{Frequency, NewEntry, SpecTree, TableCatalog};
use tabularium_core::{FieldValue, Frame, MemoryTableIo};

/// Test context with a memory backend and a catalog wired to it.
pub struct TestContext {
    /// Shared storage backend.
    pub io: Arc<MemoryTableIo>,
    /// Catalog over that backend, starting empty.
    pub catalog: TableCatalog,
}

impl TestContext {
    /// Creates a fresh context with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        let io = Arc::new(MemoryTableIo::new());
        let catalog = TableCatalog::new(io.clone());
        Self { io, catalog }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A small price/volume frame with three rows.
#[must_use]
pub fn sample_frame() -> Frame {
    frame_with_columns(&["pba_open", "pba_close", "vol_open", "vol_close"])
}

/// A frame with the given columns and three rows of numeric cells.
///
/// Cell values vary by position so content hashes differ across shapes.
#[must_use]
pub fn frame_with_columns(columns: &[&str]) -> Frame {
    let rows = (0..3)
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(col, _)| json!((row * columns.len() + col) as f64))
                .collect()
        })
        .collect();
    Frame::new(columns.iter().map(ToString::to_string).collect(), rows)
        .expect("fixture frame is well formed")
}

/// A raw-stage candidate entry for the given asset.
#[must_use]
pub fn raw_entry(root: &str) -> NewEntry {
    NewEntry::new(Frequency::Hourly, root, root, "raw")
}

/// A derive-stage candidate entry with a sequence qualifier and a desc.
#[must_use]
pub fn derive_entry(root: &str, basis: &str, desc: &str) -> NewEntry {
    NewEntry::new(Frequency::Hourly, root, basis, "derive")
        .with_stage_field("derive_kind", FieldValue::sequence(["dzn", "fracdiff"]))
        .with_desc(desc)
}

/// A report-stage candidate entry with a scalar qualifier and a desc.
#[must_use]
pub fn report_entry(root: &str, basis: &str, desc: &str) -> NewEntry {
    NewEntry::new(Frequency::Hourly, root, basis, "report")
        .with_stage_field("report_kind", FieldValue::scalar("label"))
        .with_desc(desc)
}

/// A one-group specification tree selecting raw rows for one asset, with
/// `price` and `vol` subsets split by category.
#[must_use]
pub fn price_vol_spec(root: &str) -> SpecTree {
    SpecTree::from_json(&json!({
        "priceVol": {
            "all": { "root": root, "stage": "raw" },
            "subsets": {
                "price": { "category": "price" },
                "vol": { "category": "vol" },
            }
        }
    }))
    .expect("fixture spec is well formed")
}

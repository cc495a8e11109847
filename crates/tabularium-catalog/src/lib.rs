//! # tabularium-catalog
//!
//! Dataset registry and lazy bundle composition for Tabularium.
//!
//! This crate implements the catalog domain:
//!
//! - **Entry Registry**: Map logical descriptions of dumped tables to
//!   stable ids and deterministic storage directories, with upsert
//!   deduplication of re-dumped artifacts
//! - **Structural Queries**: Fuzzy (subset) and exact matching over the
//!   fixed row schema
//! - **Specification Trees**: Declarative, arbitrarily nested descriptions
//!   of which entries a downstream stage wants
//! - **Lazy Composition**: Path-indexed bundles of deferred load
//!   references, forced later by an external executor
//! - **Group Generation**: Join-compatible combinations across composed
//!   partitions (features, labels, masks)
//!
//! ## Lifecycle
//!
//! A process constructs one [`TableCatalog`] over a
//! [`tabularium_core::TableIo`] backend and passes it to every consumer;
//! there is no ambient global. The store is single-writer: all mutation
//! goes through [`TableCatalog::dump`], persistence is explicit, and reads
//! hand out snapshots.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tabularium_catalog::{BundleRequest, SpecTree, TableCatalog};
//! use tabularium_core::FsTableIo;
//!
//! let mut catalog = TableCatalog::new(Arc::new(FsTableIo::new("/data")));
//! catalog.initialize().await?;
//!
//! let spec = SpecTree::from_json(&spec_json)?;
//! let bundle = tabularium_catalog::load_bundle(&catalog, &BundleRequest::new(spec))?;
//! for key in bundle.path_keys() {
//!     let frame = bundle.tables().get(key).unwrap().load().await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod compose;
pub mod entry;
pub mod error;
pub mod groups;
pub mod identity;
pub mod query;
pub mod spec_tree;
pub mod store;

// Re-export main types at crate root
pub use compose::{load_bundle, Bundle, BundleRequest, DeferredTable, PathKey, PathTree};
pub use entry::{Bookkeeping, Entry, EntryId, Frequency, NewEntry, ALL_COLUMNS};
pub use error::{CatalogError, Result};
pub use groups::{generate_groups, Group, GroupConstraint};
pub use identity::{derive_name, derive_path, validate_entry, IdentityOutcome};
pub use query::{MatchMode, Query, QueryValue};
pub use spec_tree::{resolve, FilterTree, ResolveMode, ResolvedLeaf, SpecLeaf, SpecTree};
pub use store::{CatalogStore, TableCatalog};

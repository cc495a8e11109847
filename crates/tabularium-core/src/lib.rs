//! # tabularium-core
//!
//! Core abstractions for the Tabularium data catalog.
//!
//! This crate provides the foundational types and traits used across all
//! Tabularium components:
//!
//! - **Frames**: A minimal ordered-column tabular value that crosses the
//!   table-I/O boundary
//! - **Field Values**: Tagged stage-qualifier values with deterministic
//!   path-segment encodings
//! - **Column Selectors**: Declarative column filters applied after a
//!   table is materialized
//! - **Table I/O**: The abstract storage boundary for tables and the
//!   persisted catalog, with memory and filesystem backends
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `tabularium-core` is the only crate allowed to define shared primitives.
//! The catalog crate builds its domain model on top of these types; it never
//! reaches around them to touch storage directly.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod field;
pub mod frame;
pub mod observability;
pub mod select;
pub mod table_io;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use field::FieldValue;
pub use frame::Frame;
pub use observability::{init_logging, LogFormat};
pub use select::{ColumnFilter, ColumnSelector, SelectorSpec};
pub use table_io::{FsTableIo, LoadOptions, MemoryTableIo, TableIo, CATALOG_FILE};

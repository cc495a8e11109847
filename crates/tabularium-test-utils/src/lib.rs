//! Shared fixtures and helpers for Tabularium tests.
//!
//! Not intended for production use.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod fixtures;

pub use fixtures::{
    derive_entry, frame_with_columns, price_vol_spec, raw_entry, report_entry, sample_frame,
    TestContext,
};

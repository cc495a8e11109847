//! Cross-crate integration tests for Tabularium.
//!
//! This crate intentionally has no library code; see `tests/`.

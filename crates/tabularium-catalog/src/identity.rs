//! Entry validation and identity derivation.
//!
//! This module is the single source of truth for how a candidate entry
//! becomes a row: which candidates are acceptable, which existing row they
//! upsert onto, and what name and storage directory they receive. All
//! derivations are pure functions of the candidate snapshot, so the same
//! semantic fields always produce the same identity regardless of what
//! else the catalog contains.
//!
//! # Path Layout
//!
//! ```text
//! {root}/{basis}/{frequency}/                      # no stage qualifiers
//! {root}/{basis}/{frequency}/{qualifier}/...       # one segment per
//!                                                  # stage-matching column,
//!                                                  # sorted by column name
//! ```

use tabularium_core::FieldValue;

use crate::entry::{EntryId, NewEntry, STAGE_COLUMNS};
use crate::error::{CatalogError, Result};
use crate::query::{match_rows, MatchMode, Query};

/// Whether identity resolution found an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// No row matched; the id is freshly assigned.
    New,
    /// A row matched; the id is reused and the dump updates in place.
    Existing,
}

/// Checks a candidate entry against the schema rules.
///
/// Required fields must be non-empty. Every stage-specific column prefixed
/// by the entry's stage tag must carry a present value. Stage fields
/// outside the schema are rejected; identity and bookkeeping cannot be
/// supplied at all because [`NewEntry`] has no slots for them.
///
/// # Errors
///
/// Returns `Validation` describing the first violation found.
pub fn validate_entry(entry: &NewEntry) -> Result<()> {
    for (field, value) in [
        ("frequency", entry.frequency.as_str()),
        ("root", entry.root.as_str()),
        ("basis", entry.basis.as_str()),
        ("stage", entry.stage.as_str()),
    ] {
        if value.is_empty() {
            return Err(CatalogError::validation(format!(
                "required field {field} is empty"
            )));
        }
    }

    for column in entry.stage_fields.keys() {
        if !STAGE_COLUMNS.contains(&column.as_str()) {
            return Err(CatalogError::validation(format!(
                "{column} is not a stage-specific column"
            )));
        }
    }

    for column in stage_matching_columns(&entry.stage) {
        match entry.stage_fields.get(column) {
            Some(value) if !value.is_absent() => {}
            _ => {
                return Err(CatalogError::validation(format!(
                    "stage {} requires field {column}",
                    entry.stage
                )));
            }
        }
    }

    Ok(())
}

/// Builds the fuzzy query that decides whether a candidate matches an
/// existing row.
///
/// Only caller-supplied fields participate: the required columns, present
/// stage qualifiers, and whichever metadata the caller set. Metadata the
/// caller left unset stays unconstrained, so a re-dump that omits a
/// category still lands on its original row.
#[must_use]
pub fn semantic_query(entry: &NewEntry) -> Query {
    let mut query = Query::new()
        .with("frequency", entry.frequency.as_str())
        .with("root", entry.root.as_str())
        .with("basis", entry.basis.as_str())
        .with("stage", entry.stage.as_str());

    for (column, value) in &entry.stage_fields {
        if let Some(text) = value.canonical_text() {
            query.insert(column.clone(), text);
        }
    }

    for (column, value) in [
        ("category", &entry.category),
        ("desc", &entry.desc),
        ("history", &entry.history),
    ] {
        if let Some(text) = value {
            query.insert(column, text.clone());
        }
    }

    query
}

/// Resolves the id for a candidate entry against the current rows.
///
/// A fuzzy match on the semantic fields reuses the matched row's id; no
/// match assigns `id = current row count`. This doubles as the upsert
/// discriminator.
///
/// # Errors
///
/// Returns an error if the semantic query is malformed, which indicates a
/// schema drift bug rather than caller error.
pub fn resolve_identity(
    rows: &[crate::entry::Entry],
    entry: &NewEntry,
) -> Result<(EntryId, IdentityOutcome)> {
    let matched = match_rows(rows, &semantic_query(entry), MatchMode::Fuzzy)?;
    match matched.first() {
        Some(row) => Ok((row.id, IdentityOutcome::Existing)),
        None => Ok((EntryId(rows.len() as u64), IdentityOutcome::New)),
    }
}

/// Derives the table name for an entry: `{root}_{stage}_{id}`.
///
/// Unique because the id is unique.
#[must_use]
pub fn derive_name(entry: &NewEntry, id: EntryId) -> String {
    format!("{}_{}_{}", entry.root, entry.stage, id)
}

/// Derives the storage directory for an entry, relative to the data root.
///
/// Starts with `{root}/{basis}/{frequency}/`, then one segment per
/// stage-matching column in sorted column order. Segment encoding is the
/// tagged rule on [`FieldValue`]. Validation guarantees stage-matching
/// columns are present; a missing one still renders as `none` rather than
/// panicking.
#[must_use]
pub fn derive_path(entry: &NewEntry) -> String {
    let mut dir = format!(
        "{}/{}/{}/",
        entry.root,
        entry.basis,
        entry.frequency.as_str()
    );

    for column in stage_matching_columns(&entry.stage) {
        let segment = entry
            .stage_fields
            .get(column)
            .map_or_else(|| FieldValue::Absent.path_segment(), FieldValue::path_segment);
        dir.push_str(&segment);
        dir.push('/');
    }

    dir
}

/// Stage-specific columns prefixed by the given stage tag, in sorted
/// column order.
fn stage_matching_columns(stage: &str) -> impl Iterator<Item = &'static str> + '_ {
    // STAGE_COLUMNS is kept sorted; the debug assertion guards the schema
    // against an unsorted edit.
    debug_assert!(STAGE_COLUMNS.windows(2).all(|w| w[0] <= w[1]));
    STAGE_COLUMNS
        .into_iter()
        .filter(move |column| column.starts_with(stage))
}

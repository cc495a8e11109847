//! The catalog store: persisted rows, lifecycle, and the dump path.
//!
//! [`TableCatalog`] owns the in-memory row set and the storage handle. All
//! mutation goes through [`TableCatalog::dump`], which is atomic to
//! callers: it either completes the whole upsert (plus optional persist)
//! or leaves the store as it was. Reads hand out clones, never mutable
//! handles.
//!
//! The [`CatalogStore`] trait is the seam for alternate backends (a
//! database-backed store, for example); another backend is a second
//! implementation, not a subclass.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, warn};

use tabularium_core::{Frame, LoadOptions, TableIo};

use crate::entry::{Bookkeeping, Entry, NewEntry, ALL_COLUMNS};
use crate::error::{CatalogError, Result};
use crate::identity::{
    derive_name, derive_path, resolve_identity, validate_entry, IdentityOutcome,
};
use crate::query::{match_rows, MatchMode, Query};

/// Capability set of a catalog backend.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Loads the persisted catalog, falling back to an empty one when no
    /// document exists yet.
    async fn initialize(&mut self) -> Result<()>;

    /// Validates, upserts, and writes one table. The only mutation path.
    async fn dump(&mut self, frame: &Frame, entry: NewEntry, persist_now: bool) -> Result<Entry>;

    /// Returns the rows satisfying a query, in row order.
    fn matches(&self, query: &Query, mode: MatchMode) -> Result<Vec<Entry>>;

    /// Returns a read-only snapshot of all rows.
    fn view(&self) -> Vec<Entry>;
}

/// The concrete catalog store over a [`TableIo`] backend.
pub struct TableCatalog {
    io: Arc<dyn TableIo>,
    rows: Vec<Entry>,
}

impl TableCatalog {
    /// Creates an empty catalog over the given backend.
    ///
    /// Call [`TableCatalog::initialize`] to pick up a persisted document.
    #[must_use]
    pub fn new(io: Arc<dyn TableIo>) -> Self {
        Self {
            io,
            rows: Vec::new(),
        }
    }

    /// Returns the storage handle, for building deferred load references.
    #[must_use]
    pub fn io(&self) -> Arc<dyn TableIo> {
        Arc::clone(&self.io)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the catalog has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drops all in-memory rows without touching the persisted document.
    pub fn reset(&mut self) {
        self.rows.clear();
    }

    /// Loads the persisted catalog document.
    ///
    /// A missing document is recoverable: the store starts empty and a
    /// warning is logged. Any other failure, including a column schema
    /// mismatch, is fatal.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` when the persisted columns differ from
    /// [`ALL_COLUMNS`], and propagates storage or parse failures.
    pub async fn initialize(&mut self) -> Result<()> {
        match self.io.read_catalog().await {
            Ok(raw) => {
                let frame: Frame = serde_json::from_slice(&raw)?;
                if frame.columns().iter().map(String::as_str).ne(ALL_COLUMNS) {
                    return Err(CatalogError::schema_mismatch(format!(
                        "persisted columns {:?} do not match the fixed schema",
                        frame.columns()
                    )));
                }
                let mut rows = Vec::with_capacity(frame.num_rows());
                for cells in frame.rows() {
                    rows.push(Entry::from_row(cells)?);
                }
                self.rows = rows;
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                warn!("catalog document not found, starting with an empty catalog");
                self.rows.clear();
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the full catalog document to storage.
    ///
    /// # Errors
    ///
    /// Propagates serialization and storage failures.
    pub async fn persist(&self) -> Result<()> {
        let frame = self.snapshot_frame()?;
        let data = serde_json::to_vec(&frame)?;
        self.io.write_catalog(Bytes::from(data)).await?;
        Ok(())
    }

    /// Returns a read-only snapshot of all rows, in row order.
    #[must_use]
    pub fn view(&self) -> Vec<Entry> {
        self.rows.clone()
    }

    /// Returns the rows satisfying a query, in row order.
    ///
    /// # Errors
    ///
    /// Propagates query validation failures.
    pub fn matches(&self, query: &Query, mode: MatchMode) -> Result<Vec<Entry>> {
        Ok(match_rows(&self.rows, query, mode)?
            .into_iter()
            .cloned()
            .collect())
    }

    /// Validates, upserts, and writes one table.
    ///
    /// The sequence is: validate the candidate, resolve its identity,
    /// derive name and directory, write the table through the backend,
    /// then commit the row. A new identity appends; an existing identity
    /// updates in place, preserving `created_at` and any metadata the
    /// caller left unset. With `persist_now` the whole document is written
    /// afterwards; a persist failure rolls the in-memory commit back.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed candidates and propagates
    /// storage failures. On error the store is unchanged.
    pub async fn dump(
        &mut self,
        frame: &Frame,
        entry: NewEntry,
        persist_now: bool,
    ) -> Result<Entry> {
        validate_entry(&entry)?;
        let (id, outcome) = resolve_identity(&self.rows, &entry)?;
        let name = derive_name(&entry, id);
        let dir = derive_path(&entry);

        self.io.ensure_dir(&dir).await?;
        debug!(%name, %dir, "dumping table");
        let size = self.io.write_table(frame, &name, &dir).await?;
        let now = Utc::now();
        let hash = frame.content_hash();

        match outcome {
            IdentityOutcome::New => {
                let row = Entry {
                    id,
                    name,
                    dir,
                    frequency: entry.frequency,
                    root: entry.root,
                    basis: entry.basis,
                    stage: entry.stage,
                    stage_fields: entry.stage_fields,
                    category: entry.category,
                    desc: entry.desc,
                    history: entry.history,
                    bookkeeping: Bookkeeping {
                        size,
                        dumped_at: now,
                        hash,
                        created_at: now,
                        modified_at: None,
                    },
                };
                self.rows.push(row.clone());
                if persist_now {
                    if let Err(err) = self.persist().await {
                        let _ = self.rows.pop();
                        return Err(err);
                    }
                }
                Ok(row)
            }
            IdentityOutcome::Existing => {
                let index = self
                    .rows
                    .iter()
                    .position(|row| row.id == id)
                    .ok_or_else(|| {
                        CatalogError::Core(tabularium_core::Error::internal(
                            "resolved id missing from row set",
                        ))
                    })?;
                let previous = self.rows[index].clone();

                let mut updated = previous.clone();
                updated.name = name;
                updated.dir = dir;
                updated.frequency = entry.frequency;
                updated.root = entry.root;
                updated.basis = entry.basis;
                updated.stage = entry.stage;
                for (column, value) in entry.stage_fields {
                    updated.stage_fields.insert(column, value);
                }
                if entry.category.is_some() {
                    updated.category = entry.category;
                }
                if entry.desc.is_some() {
                    updated.desc = entry.desc;
                }
                if entry.history.is_some() {
                    updated.history = entry.history;
                }
                updated.bookkeeping.size = size;
                updated.bookkeeping.dumped_at = now;
                updated.bookkeeping.hash = hash;
                updated.bookkeeping.modified_at = Some(now);

                self.rows[index] = updated.clone();
                if persist_now {
                    if let Err(err) = self.persist().await {
                        self.rows[index] = previous;
                        return Err(err);
                    }
                }
                Ok(updated)
            }
        }
    }

    /// Materializes the table behind one matched record.
    ///
    /// Delegates to the backend with the record's stored frequency and
    /// directory.
    ///
    /// # Errors
    ///
    /// Propagates backend failures, including `NotFound` for a record
    /// whose table was removed out of band.
    pub async fn load_for_record(&self, record: &Entry, options: &LoadOptions) -> Result<Frame> {
        self.io
            .read_table(&record.name, &record.dir, record.frequency.as_str(), options)
            .await
            .map_err(Into::into)
    }

    fn snapshot_frame(&self) -> Result<Frame> {
        let columns = ALL_COLUMNS.iter().map(ToString::to_string).collect();
        let mut cells = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            cells.push(row.to_row()?);
        }
        Frame::new(columns, cells).map_err(Into::into)
    }
}

#[async_trait]
impl CatalogStore for TableCatalog {
    async fn initialize(&mut self) -> Result<()> {
        Self::initialize(self).await
    }

    async fn dump(&mut self, frame: &Frame, entry: NewEntry, persist_now: bool) -> Result<Entry> {
        Self::dump(self, frame, entry, persist_now).await
    }

    fn matches(&self, query: &Query, mode: MatchMode) -> Result<Vec<Entry>> {
        Self::matches(self, query, mode)
    }

    fn view(&self) -> Vec<Entry> {
        Self::view(self)
    }
}

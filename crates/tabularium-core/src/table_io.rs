//! The table-I/O boundary.
//!
//! [`TableIo`] is the contract between the catalog and whatever physically
//! stores tables. The catalog hands a backend a frame, a name, and a
//! directory; the backend owns the bytes. The persisted catalog document
//! travels through the same boundary so a deployment swaps storage in one
//! place.
//!
//! Two backends ship with the core crate: [`MemoryTableIo`] for tests and
//! [`FsTableIo`] for local filesystems. Both encode frames as JSON; a
//! format-aware backend (columnar files, a database) is another
//! implementation of the same trait.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Well-known file name of the persisted catalog document.
pub const CATALOG_FILE: &str = "catalog.json";

/// Pass-through options for loading one table.
///
/// These are hints to the backend; a backend that cannot honor them returns
/// the full table and callers filter afterwards. The built-in backends
/// honor both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadOptions {
    /// Load at most this many rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<usize>,
    /// Load only these columns, in this order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

/// Storage boundary for tables and the persisted catalog document.
#[async_trait]
pub trait TableIo: Send + Sync + 'static {
    /// Writes a table under `dir` with the given name.
    ///
    /// Returns the number of bytes written.
    async fn write_table(&self, frame: &Frame, name: &str, dir: &str) -> Result<u64>;

    /// Reads a table by name and directory.
    ///
    /// `frequency` is the stored sampling frequency of the table, forwarded
    /// so format-aware backends can restore time indexes. The built-in
    /// backends ignore it.
    ///
    /// Returns `Error::NotFound` if the table does not exist.
    async fn read_table(
        &self,
        name: &str,
        dir: &str,
        frequency: &str,
        options: &LoadOptions,
    ) -> Result<Frame>;

    /// Creates the directory if it does not exist. Idempotent.
    async fn ensure_dir(&self, dir: &str) -> Result<()>;

    /// Reads the persisted catalog document.
    ///
    /// Returns `Error::NotFound` if no catalog has been persisted yet.
    async fn read_catalog(&self) -> Result<Bytes>;

    /// Writes the persisted catalog document in full.
    async fn write_catalog(&self, data: Bytes) -> Result<()>;
}

fn apply_options(frame: Frame, options: &LoadOptions) -> Result<Frame> {
    let frame = match &options.columns {
        Some(columns) => frame.select(columns)?,
        None => frame,
    };
    Ok(match options.row_limit {
        Some(limit) => frame.head(limit),
        None => frame,
    })
}

// ============================================================================
// MemoryTableIo - in-memory backend for tests
// ============================================================================

/// In-memory table backend for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryTableIo {
    tables: RwLock<HashMap<String, Frame>>,
    catalog: RwLock<Option<Bytes>>,
}

impl MemoryTableIo {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, dir: &str) -> String {
        format!("{dir}{name}")
    }
}

#[async_trait]
impl TableIo for MemoryTableIo {
    async fn write_table(&self, frame: &Frame, name: &str, dir: &str) -> Result<u64> {
        let encoded = serde_json::to_vec(frame)?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| Error::internal("lock poisoned"))?;
        tables.insert(Self::key(name, dir), frame.clone());
        Ok(encoded.len() as u64)
    }

    async fn read_table(
        &self,
        name: &str,
        dir: &str,
        _frequency: &str,
        options: &LoadOptions,
    ) -> Result<Frame> {
        let tables = self
            .tables
            .read()
            .map_err(|_| Error::internal("lock poisoned"))?;
        let frame = tables
            .get(&Self::key(name, dir))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("table not found: {dir}{name}")))?;
        apply_options(frame, options)
    }

    async fn ensure_dir(&self, _dir: &str) -> Result<()> {
        Ok(())
    }

    async fn read_catalog(&self) -> Result<Bytes> {
        let catalog = self
            .catalog
            .read()
            .map_err(|_| Error::internal("lock poisoned"))?;
        catalog
            .clone()
            .ok_or_else(|| Error::NotFound("catalog document not found".into()))
    }

    async fn write_catalog(&self, data: Bytes) -> Result<()> {
        let mut catalog = self
            .catalog
            .write()
            .map_err(|_| Error::internal("lock poisoned"))?;
        *catalog = Some(data);
        Ok(())
    }
}

// ============================================================================
// FsTableIo - local filesystem backend
// ============================================================================

/// Filesystem table backend rooted at a data directory.
///
/// Tables are stored as `{root}/{dir}/{name}.json`; the catalog document
/// lives at `{root}/catalog.json`.
#[derive(Debug, Clone)]
pub struct FsTableIo {
    root: PathBuf,
}

impl FsTableIo {
    /// Creates a backend rooted at the given directory.
    ///
    /// The directory itself is created lazily on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root data directory.
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn table_path(&self, name: &str, dir: &str) -> PathBuf {
        self.root.join(dir).join(format!("{name}.json"))
    }

    fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }
}

fn map_io_error(err: std::io::Error, what: &str) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(format!("{what} not found"))
    } else {
        Error::storage_with_source(format!("io failure on {what}"), err)
    }
}

#[async_trait]
impl TableIo for FsTableIo {
    async fn write_table(&self, frame: &Frame, name: &str, dir: &str) -> Result<u64> {
        let path = self.table_path(name, dir);
        let encoded = serde_json::to_vec(frame)?;
        let size = encoded.len() as u64;
        tracing::debug!(path = %path.display(), size, "writing table");
        tokio::fs::write(&path, encoded)
            .await
            .map_err(|e| map_io_error(e, &path.display().to_string()))?;
        Ok(size)
    }

    async fn read_table(
        &self,
        name: &str,
        dir: &str,
        _frequency: &str,
        options: &LoadOptions,
    ) -> Result<Frame> {
        let path = self.table_path(name, dir);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| map_io_error(e, &path.display().to_string()))?;
        let frame: Frame = serde_json::from_slice(&raw)?;
        apply_options(frame, options)
    }

    async fn ensure_dir(&self, dir: &str) -> Result<()> {
        let path = self.root.join(dir);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| Error::storage_with_source(format!("mkdir {}", path.display()), e))
    }

    async fn read_catalog(&self) -> Result<Bytes> {
        let path = self.catalog_path();
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| map_io_error(e, &path.display().to_string()))?;
        Ok(Bytes::from(raw))
    }

    async fn write_catalog(&self, data: Bytes) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::storage_with_source(format!("mkdir {}", self.root.display()), e))?;
        let path = self.catalog_path();
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| map_io_error(e, &path.display().to_string()))
    }
}

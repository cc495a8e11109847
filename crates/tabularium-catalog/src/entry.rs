//! The catalog entry model and its fixed persisted schema.
//!
//! One entry describes one dumped table: where it came from (`root`,
//! `basis`), how often it samples (`frequency`), which pipeline stage
//! produced it (`stage` plus stage-specific qualifiers), caller metadata,
//! and the bookkeeping the catalog generates when the table is dumped.
//!
//! The persisted catalog is itself a table whose columns are exactly
//! [`ALL_COLUMNS`], in that order. Loads that disagree are rejected.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use tabularium_core::FieldValue;

use crate::error::{CatalogError, Result};

/// Autogenerated identity columns. Never supplied by callers.
pub const ID_COLUMNS: [&str; 3] = ["id", "name", "dir"];

/// Columns required on every candidate entry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["frequency", "root", "basis", "stage"];

/// Stage-specific columns. A column is required exactly when its name is
/// prefixed by the entry's stage tag.
pub const STAGE_COLUMNS: [&str; 2] = ["derive_kind", "report_kind"];

/// Mutable caller metadata columns.
pub const META_COLUMNS: [&str; 3] = ["category", "desc", "history"];

/// Generated bookkeeping columns. Never supplied by callers.
pub const GENERATED_COLUMNS: [&str; 5] = ["size", "dumped_at", "hash", "created_at", "modified_at"];

/// The full persisted column set, in persisted order.
pub const ALL_COLUMNS: [&str; 17] = [
    "id",
    "name",
    "dir",
    "frequency",
    "root",
    "basis",
    "stage",
    "derive_kind",
    "report_kind",
    "category",
    "desc",
    "history",
    "size",
    "dumped_at",
    "hash",
    "created_at",
    "modified_at",
];

/// Returns true if `column` is part of the persisted schema.
#[must_use]
pub fn is_known_column(column: &str) -> bool {
    ALL_COLUMNS.contains(&column)
}

/// A dense integer identifier for one catalog row.
///
/// Ids are assigned by the store: a genuinely new semantic combination
/// receives the current row count; a matching combination reuses its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sampling frequency of a table.
///
/// Known variants keep the persisted codes consistent; `Other` preserves
/// forward compatibility with deployments that add their own frequencies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Frequency {
    /// Hourly bars (`H`).
    Hourly,
    /// Calendar-daily bars (`D`).
    CalDaily,
    /// Business-daily bars (`B`).
    BizDaily,
    /// A custom frequency code.
    Other(String),
}

impl Frequency {
    /// Returns the persisted short code for this frequency.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hourly => "H",
            Self::CalDaily => "D",
            Self::BizDaily => "B",
            Self::Other(code) => code.as_str(),
        }
    }

    /// Parses a persisted short code.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "H" => Self::Hourly,
            "D" => Self::CalDaily,
            "B" => Self::BizDaily,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Frequency {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from_code(&code))
    }
}

/// A candidate entry, as supplied by a caller about to dump a table.
///
/// Identity and bookkeeping are absent by construction; the store derives
/// them. Stage-specific qualifiers live in `stage_fields`, keyed by their
/// schema column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    /// Sampling frequency.
    pub frequency: Frequency,
    /// Join group (origin-stage data) or origin dataset name.
    pub root: String,
    /// Direct parent dependency. Equals `root` for origin-stage data.
    pub basis: String,
    /// Pipeline stage tag.
    pub stage: String,
    /// Stage-specific qualifiers, keyed by schema column name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_fields: BTreeMap<String, FieldValue>,
    /// Optional category tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Optional short description. Distinguishes variants that share the
    /// same semantic identity fields, and can be folded into composition
    /// path keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Optional free-form history trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
}

impl NewEntry {
    /// Creates a candidate entry with the required fields.
    #[must_use]
    pub fn new(
        frequency: Frequency,
        root: impl Into<String>,
        basis: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            frequency,
            root: root.into(),
            basis: basis.into(),
            stage: stage.into(),
            stage_fields: BTreeMap::new(),
            category: None,
            desc: None,
            history: None,
        }
    }

    /// Adds a stage-specific qualifier.
    #[must_use]
    pub fn with_stage_field(mut self, column: impl Into<String>, value: FieldValue) -> Self {
        self.stage_fields.insert(column.into(), value);
        self
    }

    /// Sets the category tag.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Sets the history trail.
    #[must_use]
    pub fn with_history(mut self, history: impl Into<String>) -> Self {
        self.history = Some(history.into());
        self
    }
}

/// Bookkeeping generated by the store when a table is dumped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookkeeping {
    /// Bytes written by the most recent dump.
    pub size: u64,
    /// Timestamp of the most recent dump.
    pub dumped_at: DateTime<Utc>,
    /// Provenance hash of the most recently dumped table.
    pub hash: u64,
    /// Timestamp of the first dump for this identity.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent re-dump, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// One full catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Dense row identifier.
    pub id: EntryId,
    /// Derived table name, unique because the id is unique.
    pub name: String,
    /// Derived storage directory, relative to the data root.
    pub dir: String,
    /// Sampling frequency.
    pub frequency: Frequency,
    /// Join group or origin dataset name.
    pub root: String,
    /// Direct parent dependency.
    pub basis: String,
    /// Pipeline stage tag.
    pub stage: String,
    /// Stage-specific qualifiers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_fields: BTreeMap<String, FieldValue>,
    /// Category tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Free-form history trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
    /// Generated bookkeeping.
    pub bookkeeping: Bookkeeping,
}

impl Entry {
    /// Returns the canonical text of one column, or `None` when the column
    /// has no value on this row.
    ///
    /// The text form is what queries match against and what the persisted
    /// document renders; stage-specific values use their path-segment
    /// encoding. Unknown columns return `None`; callers validate column
    /// names before matching.
    #[must_use]
    pub fn column_text(&self, column: &str) -> Option<String> {
        match column {
            "id" => Some(self.id.to_string()),
            "name" => Some(self.name.clone()),
            "dir" => Some(self.dir.clone()),
            "frequency" => Some(self.frequency.as_str().to_string()),
            "root" => Some(self.root.clone()),
            "basis" => Some(self.basis.clone()),
            "stage" => Some(self.stage.clone()),
            "category" => self.category.clone(),
            "desc" => self.desc.clone(),
            "history" => self.history.clone(),
            "size" => Some(self.bookkeeping.size.to_string()),
            "dumped_at" => Some(self.bookkeeping.dumped_at.to_rfc3339()),
            "hash" => Some(self.bookkeeping.hash.to_string()),
            "created_at" => Some(self.bookkeeping.created_at.to_rfc3339()),
            "modified_at" => self.bookkeeping.modified_at.map(|t| t.to_rfc3339()),
            other if STAGE_COLUMNS.contains(&other) => self
                .stage_fields
                .get(other)
                .and_then(FieldValue::canonical_text),
            _ => None,
        }
    }

    /// Renders this entry as one persisted row, cells ordered as
    /// [`ALL_COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a stage-field value cannot be
    /// encoded.
    pub fn to_row(&self) -> Result<Vec<Value>> {
        let mut row = Vec::with_capacity(ALL_COLUMNS.len());
        row.push(Value::from(self.id.0));
        row.push(Value::from(self.name.clone()));
        row.push(Value::from(self.dir.clone()));
        row.push(Value::from(self.frequency.as_str()));
        row.push(Value::from(self.root.clone()));
        row.push(Value::from(self.basis.clone()));
        row.push(Value::from(self.stage.clone()));
        for column in STAGE_COLUMNS {
            match self.stage_fields.get(column) {
                None | Some(FieldValue::Absent) => row.push(Value::Null),
                Some(value) => row.push(serde_json::to_value(value)?),
            }
        }
        row.push(opt_str(&self.category));
        row.push(opt_str(&self.desc));
        row.push(opt_str(&self.history));
        row.push(Value::from(self.bookkeeping.size));
        row.push(serde_json::to_value(self.bookkeeping.dumped_at)?);
        row.push(Value::from(self.bookkeeping.hash));
        row.push(serde_json::to_value(self.bookkeeping.created_at)?);
        match self.bookkeeping.modified_at {
            Some(at) => row.push(serde_json::to_value(at)?),
            None => row.push(Value::Null),
        }
        Ok(row)
    }

    /// Parses one persisted row, cells ordered as [`ALL_COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` on a wrong cell count and a serialization
    /// error on malformed cell values.
    pub fn from_row(cells: &[Value]) -> Result<Self> {
        if cells.len() != ALL_COLUMNS.len() {
            return Err(CatalogError::schema_mismatch(format!(
                "row has {} cells, expected {}",
                cells.len(),
                ALL_COLUMNS.len()
            )));
        }
        let mut cursor = RowCursor { cells, position: 0 };

        let id = EntryId(cursor.take_u64()?);
        let name = cursor.take_string()?;
        let dir = cursor.take_string()?;
        let frequency = Frequency::from_code(&cursor.take_string()?);
        let root = cursor.take_string()?;
        let basis = cursor.take_string()?;
        let stage = cursor.take_string()?;

        let mut stage_fields = BTreeMap::new();
        for column in STAGE_COLUMNS {
            let cell = cursor.take()?;
            if !cell.is_null() {
                let value: FieldValue = serde_json::from_value(cell.clone())?;
                stage_fields.insert(column.to_string(), value);
            }
        }

        let category = cursor.take_opt_string()?;
        let desc = cursor.take_opt_string()?;
        let history = cursor.take_opt_string()?;

        let size = cursor.take_u64()?;
        let dumped_at = cursor.take_datetime()?;
        let hash = cursor.take_u64()?;
        let created_at = cursor.take_datetime()?;
        let modified_at = cursor.take_opt_datetime()?;

        Ok(Self {
            id,
            name,
            dir,
            frequency,
            root,
            basis,
            stage,
            stage_fields,
            category,
            desc,
            history,
            bookkeeping: Bookkeeping {
                size,
                dumped_at,
                hash,
                created_at,
                modified_at,
            },
        })
    }
}

fn opt_str(value: &Option<String>) -> Value {
    value.as_ref().map_or(Value::Null, |v| Value::from(v.clone()))
}

struct RowCursor<'a> {
    cells: &'a [Value],
    position: usize,
}

impl<'a> RowCursor<'a> {
    fn take(&mut self) -> Result<&'a Value> {
        let column = ALL_COLUMNS[self.position];
        let cell = self.cells.get(self.position).ok_or_else(|| {
            CatalogError::schema_mismatch(format!("row ended before column {column}"))
        })?;
        self.position += 1;
        Ok(cell)
    }

    fn column(&self) -> &'static str {
        // position is advanced by take(), so the current column is one back
        ALL_COLUMNS[self.position.saturating_sub(1)]
    }

    fn take_string(&mut self) -> Result<String> {
        let cell = self.take()?;
        cell.as_str().map(ToString::to_string).ok_or_else(|| {
            CatalogError::schema_mismatch(format!("column {} is not a string", self.column()))
        })
    }

    fn take_opt_string(&mut self) -> Result<Option<String>> {
        let cell = self.take()?;
        if cell.is_null() {
            return Ok(None);
        }
        cell.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
            CatalogError::schema_mismatch(format!("column {} is not a string", self.column()))
        })
    }

    fn take_u64(&mut self) -> Result<u64> {
        let cell = self.take()?;
        cell.as_u64().ok_or_else(|| {
            CatalogError::schema_mismatch(format!("column {} is not an integer", self.column()))
        })
    }

    fn take_datetime(&mut self) -> Result<DateTime<Utc>> {
        let cell = self.take()?;
        Ok(serde_json::from_value(cell.clone())?)
    }

    fn take_opt_datetime(&mut self) -> Result<Option<DateTime<Utc>>> {
        let cell = self.take()?;
        if cell.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(cell.clone())?))
    }
}

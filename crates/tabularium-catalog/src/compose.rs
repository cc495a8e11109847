//! Lazy bundle composition.
//!
//! [`load_bundle`] turns a resolved specification tree into a [`Bundle`]:
//! a flat list of path keys plus two path-indexed trees of identical
//! shape, one holding matched records and one holding deferred load
//! references. No table I/O happens here; a [`DeferredTable`] is forced
//! later, by whatever executor the consuming stage uses, and each
//! reference is side-effect free so independent references can be forced
//! concurrently.
//!
//! Path keys are the join coordinate across bundles. They must be unique
//! within one bundle, and stay unique across [`Bundle::merge`]; a
//! collision is a hard error, never a silent overwrite.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use tabularium_core::{ColumnFilter, Frame, LoadOptions, TableIo};

use crate::entry::{is_known_column, Entry};
use crate::error::{CatalogError, Result};
use crate::query::MatchMode;
use crate::spec_tree::{resolve, FilterTree, ResolveMode, SpecTree};
use crate::store::TableCatalog;

/// An ordered sequence of strings identifying one leaf of a bundle.
///
/// Built from separator field values read off the matched record, the
/// traversal path through the specification tree, the result name, and
/// optionally the record's discriminator value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathKey(Vec<String>);

impl PathKey {
    /// Creates a path key from its segments.
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the segment at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Returns the first segment, if any.
    #[must_use]
    pub fn lead(&self) -> Option<&str> {
        self.get(0)
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl From<Vec<&str>> for PathKey {
    fn from(segments: Vec<&str>) -> Self {
        Self(segments.into_iter().map(ToString::to_string).collect())
    }
}

/// A nested tree indexed by path-key segments.
///
/// Child order follows insertion order, so iteration mirrors resolution
/// order.
#[derive(Debug, Clone)]
pub enum PathTree<T> {
    /// An interior node of named children.
    Branch(IndexMap<String, PathTree<T>>),
    /// A terminal value.
    Leaf(T),
}

impl<T> PathTree<T> {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::Branch(IndexMap::new())
    }

    /// Inserts a value at the given key, creating interior nodes as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePathKey` when the key is already occupied or
    /// conflicts with an existing leaf along its prefix.
    pub fn insert(&mut self, key: &PathKey, value: T) -> Result<()> {
        let (last, init) = key.segments().split_last().ok_or_else(|| {
            CatalogError::Core(tabularium_core::Error::InvalidInput(
                "path key has no segments".into(),
            ))
        })?;

        let mut node = self;
        for segment in init {
            node = match node {
                Self::Branch(children) => children
                    .entry(segment.clone())
                    .or_insert_with(PathTree::new),
                Self::Leaf(_) => {
                    return Err(CatalogError::DuplicatePathKey {
                        key: key.to_string(),
                    })
                }
            };
        }
        match node {
            Self::Branch(children) => {
                if children.contains_key(last) {
                    return Err(CatalogError::DuplicatePathKey {
                        key: key.to_string(),
                    });
                }
                children.insert(last.clone(), Self::Leaf(value));
                Ok(())
            }
            Self::Leaf(_) => Err(CatalogError::DuplicatePathKey {
                key: key.to_string(),
            }),
        }
    }

    /// Returns the value at the given key, if any.
    #[must_use]
    pub fn get(&self, key: &PathKey) -> Option<&T> {
        let mut node = self;
        for segment in key.segments() {
            match node {
                Self::Branch(children) => node = children.get(segment)?,
                Self::Leaf(_) => return None,
            }
        }
        match node {
            Self::Leaf(value) => Some(value),
            Self::Branch(_) => None,
        }
    }
}

impl<T> Default for PathTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reference to a not-yet-materialized table.
///
/// Forcing the reference reads the table through the backend and then
/// applies the column filter. References are pure reads with no ordering
/// dependency on each other.
#[derive(Clone)]
pub struct DeferredTable {
    record: Entry,
    filter: Option<ColumnFilter>,
    options: LoadOptions,
    io: Arc<dyn TableIo>,
}

impl DeferredTable {
    /// Creates a deferred reference for one matched record.
    #[must_use]
    pub fn new(
        record: Entry,
        filter: Option<ColumnFilter>,
        options: LoadOptions,
        io: Arc<dyn TableIo>,
    ) -> Self {
        Self {
            record,
            filter,
            options,
            io,
        }
    }

    /// Returns the matched record behind this reference.
    #[must_use]
    pub fn record(&self) -> &Entry {
        &self.record
    }

    /// Returns true if a column filter will be applied on load.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    /// Materializes the table and applies the column filter.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn load(&self) -> Result<Frame> {
        let frame = self
            .io
            .read_table(
                &self.record.name,
                &self.record.dir,
                self.record.frequency.as_str(),
                &self.options,
            )
            .await?;
        match &self.filter {
            Some(filter) => {
                let keep = filter.apply(frame.columns());
                frame.select(&keep).map_err(Into::into)
            }
            None => Ok(frame),
        }
    }
}

impl fmt::Debug for DeferredTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTable")
            .field("record", &self.record.name)
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

/// One composition result: path keys in resolution order plus the two
/// parallel trees.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    path_keys: Vec<PathKey>,
    records: PathTree<Entry>,
    tables: PathTree<DeferredTable>,
    seen: HashSet<PathKey>,
}

impl Bundle {
    /// Returns the path keys, in resolution order.
    #[must_use]
    pub fn path_keys(&self) -> &[PathKey] {
        &self.path_keys
    }

    /// Returns the record tree.
    #[must_use]
    pub fn records(&self) -> &PathTree<Entry> {
        &self.records
    }

    /// Returns the deferred-table tree.
    #[must_use]
    pub fn tables(&self) -> &PathTree<DeferredTable> {
        &self.tables
    }

    /// Returns the number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.path_keys.len()
    }

    /// Returns true if the bundle has no leaves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path_keys.is_empty()
    }

    /// Inserts one leaf into both trees.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePathKey` if the key was already produced.
    pub fn insert(&mut self, key: PathKey, record: Entry, table: DeferredTable) -> Result<()> {
        if !self.seen.insert(key.clone()) {
            return Err(CatalogError::DuplicatePathKey {
                key: key.to_string(),
            });
        }
        self.records.insert(&key, record)?;
        self.tables.insert(&key, table)?;
        self.path_keys.push(key);
        Ok(())
    }

    /// Absorbs another bundle's leaves, preserving their order after this
    /// bundle's own.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePathKey` on the first key both bundles produced.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        for key in other.path_keys {
            let record = other.records.get(&key).cloned().ok_or_else(|| {
                CatalogError::Core(tabularium_core::Error::internal(
                    "bundle record tree out of sync with its key list",
                ))
            })?;
            let table = other.tables.get(&key).cloned().ok_or_else(|| {
                CatalogError::Core(tabularium_core::Error::internal(
                    "bundle table tree out of sync with its key list",
                ))
            })?;
            self.insert(key, record, table)?;
        }
        Ok(())
    }

    /// Keeps only the path keys whose lead segment appears in `allowed`.
    ///
    /// The trees keep their entries; only the enumeration shrinks.
    pub fn retain_lead_segments(&mut self, allowed: &[String]) {
        self.path_keys
            .retain(|key| key.lead().is_some_and(|lead| allowed.iter().any(|a| a == lead)));
        self.seen = self.path_keys.iter().cloned().collect();
    }

    /// Keeps only the path keys matching any of the positional patterns.
    ///
    /// A pattern constrains segments by index; `None` slots match
    /// anything. The trees keep their entries; only the enumeration
    /// shrinks.
    pub fn retain_matching(&mut self, patterns: &[Vec<Option<String>>]) {
        self.path_keys.retain(|key| {
            patterns.iter().any(|pattern| {
                pattern.iter().enumerate().all(|(index, slot)| match slot {
                    None => true,
                    Some(value) => key.get(index) == Some(value.as_str()),
                })
            })
        });
        self.seen = self.path_keys.iter().cloned().collect();
    }
}

/// What to compose: a specification tree plus resolution knobs.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// The specification tree to resolve.
    pub spec: SpecTree,
    /// Optional mirrored column-filter tree.
    pub filters: Option<FilterTree>,
    /// Record columns whose values prefix every path key.
    pub separators: Vec<String>,
    /// How leaves expand.
    pub mode: ResolveMode,
    /// Optional subset-name allowlist for named-subsets mode.
    pub allowlist: Option<Vec<String>>,
    /// Pass-through load options for every deferred reference.
    pub load_options: LoadOptions,
}

impl BundleRequest {
    /// Creates a request with the default knobs: separator `root`,
    /// named-subsets mode, no filters, no allowlist.
    #[must_use]
    pub fn new(spec: SpecTree) -> Self {
        Self {
            spec,
            filters: None,
            separators: vec!["root".to_string()],
            mode: ResolveMode::default(),
            allowlist: None,
            load_options: LoadOptions::default(),
        }
    }

    /// Sets the column-filter tree.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterTree) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Sets the separator columns.
    #[must_use]
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Switches to whole-group resolution.
    #[must_use]
    pub const fn whole_group(mut self) -> Self {
        self.mode = ResolveMode::WholeGroup;
        self
    }

    /// Restricts named-subset expansion to the listed names.
    #[must_use]
    pub fn with_allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the pass-through load options.
    #[must_use]
    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }
}

/// Resolves a specification tree against the catalog into a bundle of
/// deferred load references.
///
/// Pure composition: the catalog is only queried, and no table I/O
/// happens. Every matched record contributes one leaf; the resulting path
/// keys appear in resolution order.
///
/// # Errors
///
/// Returns `UnknownColumn` for separators outside the schema,
/// `DuplicatePathKey` when two leaves collide, `Validation` when a
/// separator or folded discriminator value is missing on a matched
/// record, and propagates resolver failures.
pub fn load_bundle(catalog: &TableCatalog, request: &BundleRequest) -> Result<Bundle> {
    for separator in &request.separators {
        if !is_known_column(separator) {
            return Err(CatalogError::UnknownColumn {
                column: separator.clone(),
            });
        }
    }

    let resolved = resolve(
        &request.spec,
        request.filters.as_ref(),
        request.mode,
        request.allowlist.as_deref(),
    )?;

    let io = catalog.io();
    let mut bundle = Bundle::default();

    for leaf in resolved {
        for record in catalog.matches(&leaf.query, MatchMode::Fuzzy)? {
            let mut segments =
                Vec::with_capacity(request.separators.len() + leaf.tree_path.len() + 2);
            for separator in &request.separators {
                let value = record.column_text(separator).ok_or_else(|| {
                    CatalogError::validation(format!(
                        "record {} has no value for separator column {separator}",
                        record.name
                    ))
                })?;
                segments.push(value);
            }
            segments.extend(leaf.tree_path.iter().cloned());
            segments.push(leaf.name.clone());
            if leaf.fold_discriminator {
                let desc = record.desc.clone().ok_or_else(|| {
                    CatalogError::validation(format!(
                        "record {} has no desc to fold into its path key",
                        record.name
                    ))
                })?;
                segments.push(desc);
            }

            let key = PathKey::new(segments);
            let table = DeferredTable::new(
                record.clone(),
                leaf.filter.clone(),
                request.load_options.clone(),
                Arc::clone(&io),
            );
            bundle.insert(key, record, table)?;
        }
    }

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Frequency, NewEntry};
    use serde_json::json;
    use tabularium_core::MemoryTableIo;

    fn frame(columns: &[&str]) -> Frame {
        Frame::new(
            columns.iter().map(ToString::to_string).collect(),
            vec![columns.iter().map(|_| json!(1.0)).collect()],
        )
        .expect("valid frame")
    }

    async fn seeded_catalog() -> TableCatalog {
        let mut catalog = TableCatalog::new(Arc::new(MemoryTableIo::new()));
        for root in ["AAPL", "MSFT"] {
            catalog
                .dump(
                    &frame(&["pba_open", "pba_close", "vol_close"]),
                    NewEntry::new(Frequency::Hourly, root, root, "raw"),
                    false,
                )
                .await
                .expect("dump raw");
        }
        catalog
    }

    #[test]
    fn test_path_tree_insert_and_get() {
        let mut tree: PathTree<u32> = PathTree::new();
        let key = PathKey::from(vec!["AAPL", "priceVol", "all"]);
        tree.insert(&key, 7).expect("insert");
        assert_eq!(tree.get(&key), Some(&7));
        assert_eq!(tree.get(&PathKey::from(vec!["AAPL"])), None);
    }

    #[test]
    fn test_path_tree_rejects_conflicts() {
        let mut tree: PathTree<u32> = PathTree::new();
        let key = PathKey::from(vec!["a", "b"]);
        tree.insert(&key, 1).expect("insert");
        assert!(matches!(
            tree.insert(&key, 2),
            Err(CatalogError::DuplicatePathKey { .. })
        ));
        // A leaf along the prefix blocks deeper keys.
        assert!(tree
            .insert(&PathKey::from(vec!["a", "b", "c"]), 3)
            .is_err());
    }

    #[tokio::test]
    async fn test_whole_group_bundle_has_expected_key() {
        let catalog = seeded_catalog().await;
        let spec = SpecTree::from_json(&json!({
            "priceVol": { "all": { "root": "AAPL" } }
        }))
        .expect("valid tree");

        let bundle =
            load_bundle(&catalog, &BundleRequest::new(spec).whole_group()).expect("bundle");
        assert_eq!(bundle.len(), 1);
        assert_eq!(
            bundle.path_keys()[0],
            PathKey::from(vec!["AAPL", "priceVol", "all"])
        );
        assert!(bundle.records().get(&bundle.path_keys()[0]).is_some());
    }

    #[tokio::test]
    async fn test_unfiltered_query_spans_roots() {
        let catalog = seeded_catalog().await;
        let spec = SpecTree::from_json(&json!({
            "px": { "all": { "stage": "raw" } }
        }))
        .expect("valid tree");

        let bundle =
            load_bundle(&catalog, &BundleRequest::new(spec).whole_group()).expect("bundle");
        // One leaf per matched record; the separator keeps them distinct.
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.path_keys()[0].lead(), Some("AAPL"));
        assert_eq!(bundle.path_keys()[1].lead(), Some("MSFT"));
    }

    #[tokio::test]
    async fn test_duplicate_keys_are_fatal() {
        let mut catalog = TableCatalog::new(Arc::new(MemoryTableIo::new()));
        // Two records with the same root that both match one leaf query.
        catalog
            .dump(
                &frame(&["a"]),
                NewEntry::new(Frequency::Hourly, "AAPL", "AAPL", "raw").with_category("price"),
                false,
            )
            .await
            .expect("dump");
        catalog
            .dump(
                &frame(&["b"]),
                NewEntry::new(Frequency::Hourly, "AAPL", "AAPL", "raw").with_category("vol"),
                false,
            )
            .await
            .expect("dump");

        let spec = SpecTree::from_json(&json!({
            "px": { "all": { "stage": "raw" } }
        }))
        .expect("valid tree");
        let result = load_bundle(&catalog, &BundleRequest::new(spec).whole_group());
        assert!(matches!(
            result,
            Err(CatalogError::DuplicatePathKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_deferred_load_applies_filter() {
        let catalog = seeded_catalog().await;
        let spec = SpecTree::from_json(&json!({
            "px": { "all": { "root": "AAPL" } }
        }))
        .expect("valid tree");
        let filters = FilterTree::from_json(&json!({
            "px": { "all": [ { "startsWith": ["pba_"] } ] }
        }))
        .expect("valid filters");

        let bundle = load_bundle(
            &catalog,
            &BundleRequest::new(spec).with_filters(filters).whole_group(),
        )
        .expect("bundle");

        let key = &bundle.path_keys()[0];
        let deferred = bundle.tables().get(key).expect("deferred");
        assert!(deferred.is_filtered());
        let loaded = deferred.load().await.expect("load");
        assert_eq!(loaded.columns(), ["pba_open", "pba_close"]);
    }

    #[tokio::test]
    async fn test_merge_rejects_colliding_keys() {
        let catalog = seeded_catalog().await;
        let spec = SpecTree::from_json(&json!({
            "px": { "all": { "root": "AAPL" } }
        }))
        .expect("valid tree");
        let request = BundleRequest::new(spec).whole_group();

        let mut first = load_bundle(&catalog, &request).expect("bundle");
        let second = load_bundle(&catalog, &request).expect("bundle");
        assert!(matches!(
            first.merge(second),
            Err(CatalogError::DuplicatePathKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_retain_lead_segments_prunes_enumeration() {
        let catalog = seeded_catalog().await;
        let spec = SpecTree::from_json(&json!({
            "px": { "all": { "stage": "raw" } }
        }))
        .expect("valid tree");

        let mut bundle =
            load_bundle(&catalog, &BundleRequest::new(spec).whole_group()).expect("bundle");
        bundle.retain_lead_segments(&["MSFT".to_string()]);
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.path_keys()[0].lead(), Some("MSFT"));
    }

    #[tokio::test]
    async fn test_retain_matching_uses_positional_patterns() {
        let catalog = seeded_catalog().await;
        let spec = SpecTree::from_json(&json!({
            "px": { "all": { "stage": "raw" } }
        }))
        .expect("valid tree");

        let mut bundle =
            load_bundle(&catalog, &BundleRequest::new(spec).whole_group()).expect("bundle");
        // Constrain segment 0; leave the rest free.
        bundle.retain_matching(&[vec![Some("AAPL".to_string())]]);
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.path_keys()[0].lead(), Some("AAPL"));

        // A pattern with no match empties the enumeration.
        bundle.retain_matching(&[vec![None, Some("nope".to_string())]]);
        assert!(bundle.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_separator_is_rejected() {
        let catalog = seeded_catalog().await;
        let spec = SpecTree::from_json(&json!({
            "px": { "all": { "root": "AAPL" } }
        }))
        .expect("valid tree");
        let request = BundleRequest::new(spec)
            .whole_group()
            .with_separators(["nope"]);
        assert!(matches!(
            load_bundle(&catalog, &request),
            Err(CatalogError::UnknownColumn { .. })
        ));
    }
}

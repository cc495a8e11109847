//! Specification trees and their resolver.
//!
//! A specification tree is a nested, declarative description of which
//! catalog entries a downstream stage wants. Interior nodes are named
//! groups of arbitrary depth; a node becomes a leaf by carrying one of two
//! sentinel keys:
//!
//! - `all`: the whole-group base query,
//! - `subsets`: named partial queries, each merged over the base query.
//!
//! Column-filter trees mirror the same nesting. Absence of a filter at any
//! node means no column restriction there.
//!
//! The resolver walks the tree, accumulating the traversal path, and
//! expands every leaf into (path, result name, query, filter) tuples. It
//! performs no catalog access; composition happens in [`crate::compose`].

use indexmap::IndexMap;
use serde_json::Value;

use tabularium_core::ColumnFilter;

use crate::error::{CatalogError, Result};
use crate::query::{Query, QueryValue};

/// Sentinel key holding a leaf's whole-group base query.
pub const WHOLE_GROUP_KEY: &str = "all";

/// Sentinel key holding a leaf's named subset queries.
pub const NAMED_SUBSETS_KEY: &str = "subsets";

/// The column whose per-record value can be folded into path keys.
///
/// Folding happens exactly when a leaf's base query constrains this column
/// with a list of allowed values rather than a scalar; the list means one
/// query deliberately matches several variants, so the variant name is
/// needed to keep their path keys distinct.
pub const DISCRIMINATOR_COLUMN: &str = "desc";

/// A leaf of the specification tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecLeaf {
    /// The whole-group base query.
    pub all: Query,
    /// Named subset queries, merged over the base query on expansion.
    pub subsets: IndexMap<String, Query>,
}

impl SpecLeaf {
    /// Creates a leaf with only a base query.
    #[must_use]
    pub fn whole(all: Query) -> Self {
        Self {
            all,
            subsets: IndexMap::new(),
        }
    }

    /// Adds a named subset.
    #[must_use]
    pub fn with_subset(mut self, name: impl Into<String>, query: Query) -> Self {
        self.subsets.insert(name.into(), query);
        self
    }
}

/// A node of the specification tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecTree {
    /// An interior group of named children.
    Branch(IndexMap<String, SpecTree>),
    /// A leaf carrying queries.
    Leaf(SpecLeaf),
}

impl SpecTree {
    /// Wraps a leaf.
    #[must_use]
    pub fn leaf(leaf: SpecLeaf) -> Self {
        Self::Leaf(leaf)
    }

    /// Builds an interior group from named children.
    #[must_use]
    pub fn group<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = (S, SpecTree)>,
        S: Into<String>,
    {
        Self::Branch(
            children
                .into_iter()
                .map(|(name, child)| (name.into(), child))
                .collect(),
        )
    }

    /// Parses a specification tree from nested JSON.
    ///
    /// An object with an `all` or `subsets` key is a leaf; any other
    /// object is a group whose values parse recursively. Group names `all`
    /// and `subsets` are reserved.
    ///
    /// # Errors
    ///
    /// Returns `MalformedSpec` on empty groups, leaves without a base
    /// query, unexpected leaf keys, or non-object nodes.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            CatalogError::malformed_spec(format!("expected an object node, got {value}"))
        })?;

        if object.contains_key(WHOLE_GROUP_KEY) || object.contains_key(NAMED_SUBSETS_KEY) {
            for key in object.keys() {
                if key != WHOLE_GROUP_KEY && key != NAMED_SUBSETS_KEY {
                    return Err(CatalogError::malformed_spec(format!(
                        "unexpected key {key} beside a leaf sentinel"
                    )));
                }
            }
            let all = object
                .get(WHOLE_GROUP_KEY)
                .ok_or_else(|| CatalogError::malformed_spec("leaf is missing its base query"))
                .and_then(Query::from_json)?;
            let mut subsets = IndexMap::new();
            if let Some(raw) = object.get(NAMED_SUBSETS_KEY) {
                let map = raw.as_object().ok_or_else(|| {
                    CatalogError::malformed_spec("subsets must map names to queries")
                })?;
                for (name, sub) in map {
                    subsets.insert(name.clone(), Query::from_json(sub)?);
                }
            }
            return Ok(Self::Leaf(SpecLeaf { all, subsets }));
        }

        if object.is_empty() {
            return Err(CatalogError::malformed_spec("empty group"));
        }
        let mut children = IndexMap::new();
        for (name, sub) in object {
            children.insert(name.clone(), Self::from_json(sub)?);
        }
        Ok(Self::Branch(children))
    }
}

/// A leaf of the column-filter tree.
#[derive(Debug, Clone, Default)]
pub struct FilterLeaf {
    /// Filter for whole-group results.
    pub all: Option<ColumnFilter>,
    /// Filters for named subsets.
    pub subsets: IndexMap<String, ColumnFilter>,
}

/// A node of the column-filter tree, mirroring the specification nesting.
#[derive(Debug, Clone)]
pub enum FilterTree {
    /// An interior group of named children.
    Branch(IndexMap<String, FilterTree>),
    /// A leaf carrying compiled filters.
    Leaf(FilterLeaf),
}

impl FilterTree {
    /// Wraps a leaf.
    #[must_use]
    pub fn leaf(leaf: FilterLeaf) -> Self {
        Self::Leaf(leaf)
    }

    /// Builds an interior group from named children.
    #[must_use]
    pub fn group<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = (S, FilterTree)>,
        S: Into<String>,
    {
        Self::Branch(
            children
                .into_iter()
                .map(|(name, child)| (name.into(), child))
                .collect(),
        )
    }

    /// Parses a filter tree from nested JSON.
    ///
    /// Leaves are recognized by the same sentinel keys as specification
    /// trees; each filter is a JSON array of qualifier objects.
    ///
    /// # Errors
    ///
    /// Returns `MalformedSpec` on structural problems and propagates
    /// qualifier compilation failures.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            CatalogError::malformed_spec(format!("expected an object node, got {value}"))
        })?;

        if object.contains_key(WHOLE_GROUP_KEY) || object.contains_key(NAMED_SUBSETS_KEY) {
            let all = object
                .get(WHOLE_GROUP_KEY)
                .map(ColumnFilter::from_json)
                .transpose()?;
            let mut subsets = IndexMap::new();
            if let Some(raw) = object.get(NAMED_SUBSETS_KEY) {
                let map = raw.as_object().ok_or_else(|| {
                    CatalogError::malformed_spec("subsets must map names to filters")
                })?;
                for (name, sub) in map {
                    subsets.insert(name.clone(), ColumnFilter::from_json(sub)?);
                }
            }
            return Ok(Self::Leaf(FilterLeaf { all, subsets }));
        }

        let mut children = IndexMap::new();
        for (name, sub) in object {
            children.insert(name.clone(), Self::from_json(sub)?);
        }
        Ok(Self::Branch(children))
    }
}

/// How leaves expand into results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// One result named `all` per leaf, carrying the base query.
    WholeGroup,
    /// One result per named subset, each merged over the base query.
    #[default]
    NamedSubsets,
}

/// One expanded leaf result.
#[derive(Debug, Clone)]
pub struct ResolvedLeaf {
    /// Group names along the traversal path to the leaf.
    pub tree_path: Vec<String>,
    /// Result name: `all`, or the subset name.
    pub name: String,
    /// The query to run against the catalog.
    pub query: Query,
    /// Column filter to apply after materialization, if any.
    pub filter: Option<ColumnFilter>,
    /// True when the matched record's discriminator value belongs in the
    /// path key (see [`DISCRIMINATOR_COLUMN`]).
    pub fold_discriminator: bool,
}

/// Expands a specification tree into leaf results, in traversal order.
///
/// `allowlist`, when given, restricts named-subset expansion to the listed
/// subset names; it has no effect in whole-group mode.
///
/// # Errors
///
/// Returns `MalformedSpec` when named-subsets mode reaches a leaf with no
/// subsets.
pub fn resolve(
    spec: &SpecTree,
    filters: Option<&FilterTree>,
    mode: ResolveMode,
    allowlist: Option<&[String]>,
) -> Result<Vec<ResolvedLeaf>> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    walk(spec, filters, mode, allowlist, &mut path, &mut out)?;
    Ok(out)
}

fn walk(
    node: &SpecTree,
    filters: Option<&FilterTree>,
    mode: ResolveMode,
    allowlist: Option<&[String]>,
    path: &mut Vec<String>,
    out: &mut Vec<ResolvedLeaf>,
) -> Result<()> {
    match node {
        SpecTree::Branch(children) => {
            for (name, child) in children {
                let child_filters = filters.and_then(|tree| match tree {
                    FilterTree::Branch(map) => map.get(name),
                    FilterTree::Leaf(_) => None,
                });
                path.push(name.clone());
                walk(child, child_filters, mode, allowlist, path, out)?;
                path.pop();
            }
            Ok(())
        }
        SpecTree::Leaf(leaf) => {
            let filter_leaf = match filters {
                Some(FilterTree::Leaf(filter_leaf)) => Some(filter_leaf),
                _ => None,
            };
            let fold_discriminator = leaf
                .all
                .get(DISCRIMINATOR_COLUMN)
                .is_some_and(QueryValue::is_any_of);

            match mode {
                ResolveMode::WholeGroup => {
                    out.push(ResolvedLeaf {
                        tree_path: path.clone(),
                        name: WHOLE_GROUP_KEY.to_string(),
                        query: leaf.all.clone(),
                        filter: filter_leaf.and_then(|l| l.all.clone()),
                        fold_discriminator,
                    });
                }
                ResolveMode::NamedSubsets => {
                    if leaf.subsets.is_empty() {
                        return Err(CatalogError::malformed_spec(format!(
                            "leaf at {} has no named subsets",
                            path.join("/")
                        )));
                    }
                    for (name, sub) in &leaf.subsets {
                        if let Some(allow) = allowlist {
                            if !allow.iter().any(|a| a == name) {
                                continue;
                            }
                        }
                        out.push(ResolvedLeaf {
                            tree_path: path.clone(),
                            name: name.clone(),
                            query: leaf.all.merged_with(sub),
                            filter: filter_leaf.and_then(|l| l.subsets.get(name).cloned()),
                            fold_discriminator,
                        });
                    }
                }
            }
            Ok(())
        }
    }
}

//! Cross-partition group generation.
//!
//! A consuming stage typically composes several bundles with different
//! roles (features, labels, auxiliary masks) and then needs every
//! join-compatible combination of their leaves. [`generate_groups`] walks
//! the ordered cross product of the partitions' path-key lists, keeps the
//! combinations a [`GroupConstraint`] accepts, and pairs each surviving
//! key tuple with its deferred tables.

use std::fmt;
use std::sync::Arc;

use crate::compose::{Bundle, DeferredTable, PathKey};
use crate::error::{CatalogError, Result};

/// Join-compatibility predicate over one path key per partition.
#[derive(Clone, Default)]
pub enum GroupConstraint {
    /// Accept every combination.
    Unconstrained,
    /// The lead segment (the origin asset, under default separators) must
    /// be equal across all partitions.
    #[default]
    SameLeadSegment,
    /// Lead segments must match across all partitions, and two designated
    /// partitions must additionally agree on the segment at `index`
    /// (a source-lineage coordinate).
    SameLeadAndSegment {
        /// Positions of the two partitions that must also agree.
        pair: (usize, usize),
        /// Segment index that must match between the pair.
        index: usize,
    },
    /// A caller-supplied predicate.
    Custom(Arc<dyn Fn(&[&PathKey]) -> bool + Send + Sync>),
}

impl fmt::Debug for GroupConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconstrained => write!(f, "Unconstrained"),
            Self::SameLeadSegment => write!(f, "SameLeadSegment"),
            Self::SameLeadAndSegment { pair, index } => f
                .debug_struct("SameLeadAndSegment")
                .field("pair", pair)
                .field("index", index)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// One join-compatible combination: a path key and its deferred table per
/// partition, in partition order.
#[derive(Debug, Clone)]
pub struct Group<'a> {
    /// One path key per partition.
    pub keys: Vec<&'a PathKey>,
    /// The deferred table behind each key.
    pub tables: Vec<&'a DeferredTable>,
}

/// Yields every join-compatible combination across the partitions.
///
/// The cross product follows each partition's path-key order, first
/// partition slowest. Combinations are built from the partitions'
/// enumerations, so keys pruned by a retain pass do not participate.
///
/// # Errors
///
/// Returns an error when a `SameLeadAndSegment` pair references a
/// partition that does not exist.
pub fn generate_groups<'a>(
    partitions: &[&'a Bundle],
    constraint: &GroupConstraint,
) -> Result<Vec<Group<'a>>> {
    if let GroupConstraint::SameLeadAndSegment { pair, .. } = constraint {
        let bound = partitions.len();
        if pair.0 >= bound || pair.1 >= bound {
            return Err(CatalogError::Core(tabularium_core::Error::InvalidInput(
                format!("constraint pair {pair:?} out of range for {bound} partitions"),
            )));
        }
    }

    let lists: Vec<&[PathKey]> = partitions.iter().map(|b| b.path_keys()).collect();
    if lists.is_empty() || lists.iter().any(|list| list.is_empty()) {
        return Ok(Vec::new());
    }

    let mut groups = Vec::new();
    let mut indices = vec![0usize; lists.len()];

    loop {
        let keys: Vec<&PathKey> = lists
            .iter()
            .zip(&indices)
            .map(|(list, &index)| &list[index])
            .collect();

        if satisfies(constraint, &keys) {
            let tables = partitions
                .iter()
                .zip(&keys)
                .map(|(bundle, key)| {
                    bundle.tables().get(key).ok_or_else(|| {
                        CatalogError::Core(tabularium_core::Error::internal(
                            "bundle table tree out of sync with its key list",
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            groups.push(Group { keys, tables });
        }

        // Odometer advance, last partition fastest.
        let mut position = lists.len();
        loop {
            if position == 0 {
                return Ok(groups);
            }
            position -= 1;
            indices[position] += 1;
            if indices[position] < lists[position].len() {
                break;
            }
            indices[position] = 0;
        }
    }
}

fn satisfies(constraint: &GroupConstraint, keys: &[&PathKey]) -> bool {
    match constraint {
        GroupConstraint::Unconstrained => true,
        GroupConstraint::SameLeadSegment => segment_agrees(keys, 0),
        GroupConstraint::SameLeadAndSegment { pair, index } => {
            let left = keys[pair.0].get(*index);
            segment_agrees(keys, 0) && left.is_some() && left == keys[pair.1].get(*index)
        }
        GroupConstraint::Custom(predicate) => predicate(keys),
    }
}

fn segment_agrees(keys: &[&PathKey], index: usize) -> bool {
    let first = keys[0].get(index);
    first.is_some() && keys.iter().all(|key| key.get(index) == first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{load_bundle, BundleRequest};
    use crate::entry::{Frequency, NewEntry};
    use crate::query::Query;
    use crate::spec_tree::{SpecLeaf, SpecTree};
    use crate::store::TableCatalog;
    use serde_json::json;
    use tabularium_core::{FieldValue, Frame, MemoryTableIo};

    fn frame() -> Frame {
        Frame::new(vec!["x".into()], vec![vec![json!(1.0)]]).expect("valid frame")
    }

    async fn seeded_catalog() -> TableCatalog {
        let mut catalog = TableCatalog::new(Arc::new(MemoryTableIo::new()));
        for root in ["AAPL", "MSFT"] {
            catalog
                .dump(
                    &frame(),
                    NewEntry::new(Frequency::Hourly, root, root, "raw"),
                    false,
                )
                .await
                .expect("dump raw");
            catalog
                .dump(
                    &frame(),
                    NewEntry::new(Frequency::Hourly, root, format!("{root}_raw"), "report")
                        .with_stage_field("report_kind", FieldValue::scalar("label"))
                        .with_desc(format!("{root}_label")),
                    false,
                )
                .await
                .expect("dump labels");
        }
        catalog
    }

    async fn partition(catalog: &TableCatalog, stage: &str, group: &str) -> Bundle {
        let spec = SpecTree::group([(
            group,
            SpecTree::leaf(SpecLeaf::whole(Query::new().with("stage", stage))),
        )]);
        load_bundle(catalog, &BundleRequest::new(spec).whole_group()).expect("bundle")
    }

    #[tokio::test]
    async fn test_default_constraint_pairs_same_asset() {
        let catalog = seeded_catalog().await;
        let features = partition(&catalog, "raw", "features").await;
        let labels = partition(&catalog, "report", "labels").await;

        let groups =
            generate_groups(&[&features, &labels], &GroupConstraint::default()).expect("groups");
        // 2 feature leaves x 2 label leaves, constrained to matching roots.
        assert_eq!(groups.len(), 2);
        for group in &groups {
            assert_eq!(group.keys[0].lead(), group.keys[1].lead());
            assert_eq!(group.tables.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_unconstrained_yields_full_product() {
        let catalog = seeded_catalog().await;
        let features = partition(&catalog, "raw", "features").await;
        let labels = partition(&catalog, "report", "labels").await;

        let groups =
            generate_groups(&[&features, &labels], &GroupConstraint::Unconstrained)
                .expect("groups");
        assert_eq!(groups.len(), 4);
        // First partition varies slowest.
        assert_eq!(groups[0].keys[0].lead(), Some("AAPL"));
        assert_eq!(groups[1].keys[0].lead(), Some("AAPL"));
    }

    #[tokio::test]
    async fn test_pair_segment_constraint() {
        let catalog = seeded_catalog().await;
        let features = partition(&catalog, "raw", "g").await;
        let labels = partition(&catalog, "report", "g").await;

        // Segment 1 is the group name, equal here across both partitions.
        let constraint = GroupConstraint::SameLeadAndSegment {
            pair: (0, 1),
            index: 1,
        };
        let groups = generate_groups(&[&features, &labels], &constraint).expect("groups");
        assert_eq!(groups.len(), 2);

        let out_of_range = GroupConstraint::SameLeadAndSegment {
            pair: (0, 5),
            index: 1,
        };
        assert!(generate_groups(&[&features, &labels], &out_of_range).is_err());
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let catalog = seeded_catalog().await;
        let features = partition(&catalog, "raw", "features").await;
        let labels = partition(&catalog, "report", "labels").await;

        let only_aapl = GroupConstraint::Custom(Arc::new(|keys: &[&PathKey]| {
            keys.iter().all(|key| key.lead() == Some("AAPL"))
        }));
        let groups = generate_groups(&[&features, &labels], &only_aapl).expect("groups");
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_empty_partitions_yield_nothing() {
        let groups = generate_groups(&[], &GroupConstraint::default()).expect("groups");
        assert!(groups.is_empty());
    }
}

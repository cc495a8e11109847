//! Composition contracts for bundles.
//!
//! # Invariants Tested
//!
//! 1. Path keys are separator values + tree path + result name, with the
//!    record's desc folded in exactly when the base query lists descs
//! 2. The flat key list preserves resolution order and never repeats
//! 3. Composition performs no table I/O; loads happen only when forced
//! 4. Deferred references are independent and safe to force concurrently

use std::sync::Arc;

use serde_json::json;

use tabularium_catalog::{
    load_bundle, BundleRequest, Frequency, NewEntry, PathKey, SpecTree, TableCatalog,
};
use tabularium_core::{FieldValue, Frame, MemoryTableIo};

fn frame(columns: &[&str]) -> Frame {
    Frame::new(
        columns.iter().map(ToString::to_string).collect(),
        vec![columns.iter().enumerate().map(|(i, _)| json!(i)).collect()],
    )
    .expect("valid frame")
}

fn derive(root: &str, desc: &str) -> NewEntry {
    NewEntry::new(Frequency::Hourly, root, format!("{root}_raw_0"), "derive")
        .with_stage_field("derive_kind", FieldValue::scalar("dzn"))
        .with_desc(desc)
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
        for desc in ["pba_dzn", "vol_dzn"] {
            catalog
                .dump(&frame(&["pba_open", "vol_close"]), derive(root, desc), false)
                .await
                .expect("dump derived");
        }
    }
    catalog
}

#[tokio::test]
async fn contract_desc_folding_follows_base_query_shape() {
    let catalog = seeded_catalog().await;

    // The base query lists descs, so each record's desc lands in its key.
    let listed = SpecTree::from_json(&json!({
        "feats": { "all": { "stage": "derive", "desc": ["pba_dzn", "vol_dzn"] } }
    }))
    .expect("valid tree");
    let bundle =
        load_bundle(&catalog, &BundleRequest::new(listed).whole_group()).expect("bundle");
    assert_eq!(bundle.len(), 4);
    assert!(bundle
        .path_keys()
        .contains(&PathKey::from(vec!["AAPL", "feats", "all", "pba_dzn"])));
    assert!(bundle
        .path_keys()
        .contains(&PathKey::from(vec!["MSFT", "feats", "all", "vol_dzn"])));

    // A scalar desc means one variant per leaf; no folding.
    let scalar = SpecTree::from_json(&json!({
        "feats": { "all": { "stage": "derive", "desc": "pba_dzn" } }
    }))
    .expect("valid tree");
    let bundle =
        load_bundle(&catalog, &BundleRequest::new(scalar).whole_group()).expect("bundle");
    assert_eq!(bundle.len(), 2);
    assert_eq!(
        bundle.path_keys()[0],
        PathKey::from(vec!["AAPL", "feats", "all"])
    );
}

#[tokio::test]
async fn contract_named_subsets_and_allowlist() {
    let catalog = seeded_catalog().await;
    let spec = SpecTree::from_json(&json!({
        "feats": {
            "all": { "stage": "derive" },
            "subsets": {
                "pba": { "desc": "pba_dzn" },
                "vol": { "desc": "vol_dzn" },
            }
        }
    }))
    .expect("valid tree");

    let bundle = load_bundle(&catalog, &BundleRequest::new(spec.clone())).expect("bundle");
    assert_eq!(bundle.len(), 4);
    // Subset order then row order, first subset first.
    assert_eq!(
        bundle.path_keys()[0],
        PathKey::from(vec!["AAPL", "feats", "pba"])
    );
    assert_eq!(
        bundle.path_keys()[1],
        PathKey::from(vec!["MSFT", "feats", "pba"])
    );

    let restricted = load_bundle(
        &catalog,
        &BundleRequest::new(spec).with_allowlist(["vol"]),
    )
    .expect("bundle");
    assert_eq!(restricted.len(), 2);
    assert!(restricted
        .path_keys()
        .iter()
        .all(|key| key.get(2) == Some("vol")));
}

#[tokio::test]
async fn contract_no_duplicate_path_keys() {
    let catalog = seeded_catalog().await;
    let spec = SpecTree::from_json(&json!({
        "feats": { "all": { "stage": "derive", "desc": ["pba_dzn", "vol_dzn"] } }
    }))
    .expect("valid tree");
    let bundle =
        load_bundle(&catalog, &BundleRequest::new(spec).whole_group()).expect("bundle");

    let mut seen = std::collections::HashSet::new();
    for key in bundle.path_keys() {
        assert!(seen.insert(key.clone()), "repeated key {key}");
    }
}

#[tokio::test]
async fn contract_composition_defers_all_loading() {
    use tabularium_core::TableIo;

    // Copy only the catalog document to a fresh backend that holds no
    // tables. Composition over it must still succeed; forcing a reference
    // must fail, proving no table I/O happened during composition.
    let catalog = seeded_catalog().await;
    catalog.persist().await.expect("persist");
    let document = catalog.io().read_catalog().await.expect("read document");

    let bare_io = Arc::new(MemoryTableIo::new());
    bare_io.write_catalog(document).await.expect("write document");
    let mut shadow = TableCatalog::new(bare_io);
    shadow.initialize().await.expect("initialize");

    let spec = SpecTree::from_json(&json!({
        "px": { "all": { "stage": "raw" } }
    }))
    .expect("valid tree");
    let bundle =
        load_bundle(&shadow, &BundleRequest::new(spec).whole_group()).expect("bundle");
    assert_eq!(bundle.len(), 2);

    let key = &bundle.path_keys()[0];
    let deferred = bundle.tables().get(key).expect("deferred");
    assert!(deferred.load().await.is_err());
}

#[tokio::test]
async fn contract_deferred_references_force_concurrently() {
    let catalog = seeded_catalog().await;
    let spec = SpecTree::from_json(&json!({
        "feats": { "all": { "stage": "derive", "desc": ["pba_dzn", "vol_dzn"] } }
    }))
    .expect("valid tree");
    let bundle =
        load_bundle(&catalog, &BundleRequest::new(spec).whole_group()).expect("bundle");

    let mut tasks = tokio::task::JoinSet::new();
    for key in bundle.path_keys() {
        let deferred = bundle.tables().get(key).expect("deferred").clone();
        tasks.spawn(async move { deferred.load().await });
    }

    let mut loaded = 0;
    while let Some(result) = tasks.join_next().await {
        let frame = result.expect("join").expect("load");
        assert_eq!(frame.num_rows(), 1);
        loaded += 1;
    }
    assert_eq!(loaded, bundle.len());
}

#[tokio::test]
async fn contract_record_tree_mirrors_table_tree() {
    let catalog = seeded_catalog().await;
    let spec = SpecTree::from_json(&json!({
        "px": { "all": { "stage": "raw" } }
    }))
    .expect("valid tree");
    let bundle =
        load_bundle(&catalog, &BundleRequest::new(spec).whole_group()).expect("bundle");

    for key in bundle.path_keys() {
        let record = bundle.records().get(key).expect("record");
        let table = bundle.tables().get(key).expect("table");
        assert_eq!(record, table.record());
        assert_eq!(Some(record.root.as_str()), key.lead());
    }
}

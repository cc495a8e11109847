//! End-to-end flow: dump, persist, reload, compose, group, force.
//!
//! Exercises the whole pipeline a consuming stage runs: raw and derived
//! tables are dumped for several assets, the catalog round-trips through
//! its document, feature and label partitions are composed lazily, merged
//! across requests, grouped under join constraints, and finally forced.

use serde_json::json;

use tabularium_catalog::{
    generate_groups, load_bundle, BundleRequest, CatalogError, GroupConstraint, Query, SpecTree,
    TableCatalog,
};
use tabularium_core::LoadOptions;
use tabularium_test_utils::{
    derive_entry, frame_with_columns, raw_entry, report_entry, sample_frame, TestContext,
};

const ASSETS: [&str; 2] = ["AAPL", "MSFT"];

async fn seed(catalog: &mut TableCatalog) {
    for asset in ASSETS {
        catalog
            .dump(&sample_frame(), raw_entry(asset).with_category("price"), false)
            .await
            .expect("dump raw");
        let basis = format!("{asset}_raw");
        for desc in ["pba_dzn", "vol_dzn"] {
            catalog
                .dump(
                    &frame_with_columns(&["pba_open", "pba_close"]),
                    derive_entry(asset, &basis, desc),
                    false,
                )
                .await
                .expect("dump derived");
        }
        catalog
            .dump(
                &frame_with_columns(&["label_eod"]),
                report_entry(asset, &basis, &format!("{asset}_label")),
                false,
            )
            .await
            .expect("dump labels");
    }
}

fn features_spec() -> SpecTree {
    SpecTree::from_json(&json!({
        "features": {
            "all": { "stage": "derive", "desc": ["pba_dzn", "vol_dzn"] }
        }
    }))
    .expect("valid tree")
}

fn labels_spec() -> SpecTree {
    SpecTree::from_json(&json!({
        "labels": {
            "all": { "stage": "report" }
        }
    }))
    .expect("valid tree")
}

#[tokio::test]
async fn dataset_flow_compose_group_force() {
    let mut ctx = TestContext::new();
    seed(&mut ctx.catalog).await;
    ctx.catalog.persist().await.expect("persist");

    // Fresh handle over the same backend sees the same rows.
    let mut catalog = TableCatalog::new(ctx.io.clone());
    catalog.initialize().await.expect("initialize");
    assert_eq!(catalog.len(), ctx.catalog.len());

    let features = load_bundle(
        &catalog,
        &BundleRequest::new(features_spec()).whole_group(),
    )
    .expect("features bundle");
    let labels = load_bundle(&catalog, &BundleRequest::new(labels_spec()).whole_group())
        .expect("labels bundle");

    // Two assets, two derived variants each; desc is folded into the key.
    assert_eq!(features.len(), 4);
    assert_eq!(labels.len(), 2);

    let groups = generate_groups(&[&features, &labels], &GroupConstraint::default())
        .expect("groups");
    // Each asset pairs its two feature variants with its one label leaf.
    assert_eq!(groups.len(), 4);
    for group in &groups {
        assert_eq!(group.keys[0].lead(), group.keys[1].lead());
        let feature = group.tables[0].load().await.expect("force feature");
        let label = group.tables[1].load().await.expect("force label");
        assert_eq!(feature.columns(), ["pba_open", "pba_close"]);
        assert_eq!(label.columns(), ["label_eod"]);
    }
}

#[tokio::test]
async fn dataset_flow_merge_and_prune() {
    let mut ctx = TestContext::new();
    seed(&mut ctx.catalog).await;

    let mut combined = load_bundle(
        &ctx.catalog,
        &BundleRequest::new(features_spec()).whole_group(),
    )
    .expect("features bundle");
    let labels = load_bundle(
        &ctx.catalog,
        &BundleRequest::new(labels_spec()).whole_group(),
    )
    .expect("labels bundle");

    let before = combined.len();
    combined.merge(labels).expect("merge disjoint partitions");
    assert_eq!(combined.len(), before + 2);

    // Merging the same request twice collides on every key.
    let again = load_bundle(
        &ctx.catalog,
        &BundleRequest::new(features_spec()).whole_group(),
    )
    .expect("features bundle");
    assert!(matches!(
        combined.merge(again),
        Err(CatalogError::DuplicatePathKey { .. })
    ));

    // Asset pruning narrows the enumeration to one asset.
    combined.retain_lead_segments(&["AAPL".to_string()]);
    assert!(combined
        .path_keys()
        .iter()
        .all(|key| key.lead() == Some("AAPL")));
}

#[tokio::test]
async fn dataset_flow_row_limits_pass_through() {
    let mut ctx = TestContext::new();
    seed(&mut ctx.catalog).await;

    let request = BundleRequest::new(labels_spec())
        .whole_group()
        .with_load_options(LoadOptions {
            row_limit: Some(1),
            columns: None,
        });
    let labels = load_bundle(&ctx.catalog, &request).expect("labels bundle");

    let key = &labels.path_keys()[0];
    let frame = labels.tables().get(key).expect("deferred").load().await.expect("force");
    assert_eq!(frame.num_rows(), 1);
}

#[tokio::test]
async fn dataset_flow_exact_and_fuzzy_queries_agree_on_scalars() {
    let mut ctx = TestContext::new();
    seed(&mut ctx.catalog).await;

    let query = Query::new().with("root", "AAPL").with("stage", "derive");
    let fuzzy = ctx
        .catalog
        .matches(&query, tabularium_catalog::MatchMode::Fuzzy)
        .expect("fuzzy");
    let exact = ctx
        .catalog
        .matches(&query, tabularium_catalog::MatchMode::Exact)
        .expect("exact");
    assert_eq!(fuzzy, exact);
    assert_eq!(fuzzy.len(), 2);
}

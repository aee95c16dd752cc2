//! Diff and apply against a single store

use deck_core::apply::{ApplyMode, apply, reconcile};
use deck_core::declarative::DeclarativeConfig;
use deck_core::diff::{ConfigDiff, Operation, diff_configs, diff_entity_list};
use deck_core::export::{ExportOptions, export, flatten};
use deck_store::{EntityKind, EntityRecord, MemoryStore};
use deck_test_utils::{entities, stores};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn record(value: Value) -> EntityRecord {
    value.as_object().cloned().unwrap()
}

fn state(yaml: &str) -> DeclarativeConfig {
    DeclarativeConfig::from_yaml_str(yaml).unwrap()
}

#[test]
fn missing_service_is_created() {
    let desired = vec![record(json!({"name": "api", "host": "a.local"}))];

    let diffs = diff_entity_list(EntityKind::Service, &[], &desired);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].operation, Operation::Create);
    assert_eq!(diffs[0].key, "api");

    let mut store = MemoryStore::new("gw");
    let results = apply(&mut store, &diffs, false);
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert!(store.find(EntityKind::Service, "api").is_some());
}

#[test]
fn changed_host_is_an_update_with_field_detail() {
    let current = vec![record(json!({"name": "api", "host": "a.local"}))];
    let desired = vec![record(json!({"name": "api", "host": "b.local"}))];

    let diffs = diff_entity_list(EntityKind::Service, &current, &desired);

    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].operation, Operation::Update);
    assert_eq!(diffs[0].changes.len(), 1);
    assert_eq!(diffs[0].changes["host"].old, json!("a.local"));
    assert_eq!(diffs[0].changes["host"].new, json!("b.local"));
}

#[test]
fn service_is_created_before_the_route_that_references_it() {
    let diffs = vec![
        ConfigDiff::create(
            EntityKind::Route,
            record(entities::route("r1", entities::name_ref("api"), &["/"])),
        ),
        ConfigDiff::create(EntityKind::Service, record(entities::service("api", "a.local"))),
    ];
    let mut store = MemoryStore::new("gw");

    let results = apply(&mut store, &diffs, false);

    let order: Vec<(EntityKind, &str)> = results
        .iter()
        .map(|r| (r.diff.entity_kind, r.diff.key.as_str()))
        .collect();
    assert_eq!(order, vec![(EntityKind::Service, "api"), (EntityKind::Route, "r1")]);
    assert!(results.iter().all(|r| r.is_success()));
}

#[test]
fn exported_state_reapplies_as_no_op() {
    let (gateway, _) = stores::gateway_only();
    let snapshot = export(&gateway, &[], &ExportOptions::default()).unwrap();

    let summary = diff_configs(&snapshot, &snapshot);

    assert!(summary.is_empty());
}

#[test]
fn reconcile_from_a_state_file() {
    let mut store = MemoryStore::new("gw").with(
        EntityKind::Service,
        json!({"name": "old", "host": "old.local"}),
    );
    let current = export(&store, &[], &ExportOptions::default()).unwrap();
    let desired = state(
        r#"
_format_version: "3.0"
services:
  - name: api
    host: a.local
    routes:
      - name: r1
        paths: ["/api"]
"#,
    );
    let desired = flatten(&desired);

    let report = reconcile(&mut store, &current, &desired, false).unwrap();

    assert_eq!(report.mode, ApplyMode::Incremental);
    assert_eq!(report.summary.creates[&EntityKind::Service], 1);
    assert_eq!(report.summary.creates[&EntityKind::Route], 1);
    assert_eq!(report.summary.deletes[&EntityKind::Service], 1);
    assert_eq!(report.failed_count(), 0);
    assert!(store.find(EntityKind::Service, "old").is_none());
    assert_eq!(
        store.find(EntityKind::Route, "r1").unwrap()["service"],
        json!({"name": "api"})
    );
}

#[test]
fn invalid_entity_fails_before_reaching_the_store() {
    let diffs = vec![ConfigDiff::create(
        EntityKind::Route,
        record(json!({"name": "nowhere"})),
    )];
    let mut store = MemoryStore::new("gw");

    let results = apply(&mut store, &diffs, false);

    assert!(!results[0].is_success());
    assert!(results[0].error.as_deref().unwrap().contains("nowhere"));
    assert_eq!(store.mutation_count(), 0);
}

#[test]
fn upstream_targets_outside_the_comparison_reapply_as_no_op() {
    let options = ExportOptions::default();
    let desired = options.retain_included(&flatten(&state(
        r#"
upstreams:
  - name: up
    targets:
      - target: a:80
"#,
    )));
    let mut store = MemoryStore::new("gw");

    let current = export(&store, &[EntityKind::Upstream], &options).unwrap();
    let first = reconcile(&mut store, &current, &desired, false).unwrap();
    assert_eq!(first.summary.total_changes(), 1);

    let after = export(&store, &[EntityKind::Upstream], &options).unwrap();
    assert!(diff_configs(&after, &desired).is_empty());
    let second = reconcile(&mut store, &after, &desired, false).unwrap();
    assert!(second.summary.is_empty());
}

#[test]
fn bare_name_reference_matches_a_stored_id_reference() {
    let mut store = MemoryStore::new("gw");
    let service_id = stores::seed(&mut store, EntityKind::Service, entities::service("api", "a.local"));
    stores::seed(
        &mut store,
        EntityKind::Route,
        entities::route("r1", entities::id_ref(&service_id), &["/api"]),
    );
    let current = export(&store, &[], &ExportOptions::default()).unwrap();

    let desired = flatten(&state(
        r#"
services:
  - name: api
    host: a.local
    port: 80
    protocol: http
routes:
  - name: r1
    paths: ["/api"]
    service: api
"#,
    ));

    assert_eq!(desired.entities(EntityKind::Route)[0]["service"], json!({"name": "api"}));
    assert!(diff_configs(&current, &desired).is_empty());
}

use std::collections::BTreeMap;

use deck_core::apply::apply;
use deck_core::conflict::AssumeYes;
use deck_core::diff::{ConfigDiff, diff_configs, diff_entity_list, entity_key};
use deck_core::export::{ExportOptions, export};
use deck_core::sync::{SyncEngine, SyncOptions};
use deck_store::{EntityKind, EntityRecord, MemoryStore};
use deck_test_utils::entities;
use proptest::prelude::*;

/// Service name to host, drawn from small pools so the two sides overlap
fn services() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("svc-[a-e]", "[a-c]\\.local", 0..5)
}

fn store(label: &str, services: &BTreeMap<String, String>) -> MemoryStore {
    let mut store = MemoryStore::new(label);
    for (name, host) in services {
        store.seed(EntityKind::Service, entities::service(name, host));
    }
    store
}

fn records(services: &BTreeMap<String, String>) -> Vec<EntityRecord> {
    services
        .iter()
        .map(|(name, host)| entities::service(name, host).as_object().cloned().unwrap())
        .collect()
}

proptest! {
    #[test]
    fn applying_a_diff_converges(current in services(), desired in services()) {
        let mut target = store("target", &current);
        let snapshot = export(&target, &[EntityKind::Service], &ExportOptions::default()).unwrap();

        let diffs: Vec<ConfigDiff> = diff_entity_list(
            EntityKind::Service,
            snapshot.entities(EntityKind::Service),
            &records(&desired),
        );
        let results = apply(&mut target, &diffs, false);
        prop_assert!(results.iter().all(|r| r.is_success()));

        let after = export(&target, &[EntityKind::Service], &ExportOptions::default()).unwrap();
        let remaining = diff_entity_list(
            EntityKind::Service,
            after.entities(EntityKind::Service),
            &records(&desired),
        );
        prop_assert!(remaining.is_empty(), "left over: {:?}", remaining);
    }

    #[test]
    fn diff_of_a_snapshot_with_itself_is_empty(services in services()) {
        let source = store("source", &services);
        let snapshot = export(&source, &[], &ExportOptions::default()).unwrap();
        prop_assert!(diff_configs(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn every_drifted_pair_becomes_a_conflict(gateway in services(), control_plane in services()) {
        let expected: Vec<String> = gateway
            .iter()
            .filter(|(name, host)| control_plane.get(*name).is_some_and(|other| other != *host))
            .map(|(name, _)| name.clone())
            .collect();
        let mut gw = store("gw", &gateway);
        let mut cp = store("cp", &control_plane);
        let options = SyncOptions { dry_run: true, ..SyncOptions::default() };

        let report = SyncEngine::new(&mut gw, &mut cp).push(&options, &mut AssumeYes).unwrap();

        let mut keys: Vec<String> = report
            .conflicts
            .iter()
            .map(|c| entity_key(&c.source_state, Some(c.entity_kind)))
            .collect();
        keys.sort();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn forced_push_leaves_the_pair_in_sync(gateway in services(), control_plane in services()) {
        let mut gw = store("gw", &gateway);
        let mut cp = store("cp", &control_plane);
        let options = SyncOptions { force: true, ..SyncOptions::default() };
        let mut engine = SyncEngine::new(&mut gw, &mut cp);

        let report = engine.push(&options, &mut AssumeYes).unwrap();
        prop_assert!(report.is_success());

        let view = engine.status(&[EntityKind::Service], false).unwrap();
        prop_assert_eq!(view.drifted().count(), 0);
        prop_assert_eq!(view.totals().gateway_only, 0);
    }
}

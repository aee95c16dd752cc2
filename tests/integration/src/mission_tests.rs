//! Mission-based integration tests
//!
//! Each test walks an operator workflow end to end across the store, sync,
//! audit and rollback layers, using in-memory stores on both sides.

use deck_core::apply::{ApplyMode, reconcile};
use deck_core::conflict::AssumeYes;
use deck_core::declarative::DeclarativeConfig;
use deck_core::export::{ExportOptions, export, flatten};
use deck_core::rollback::{execute_rollback, preview_rollback};
use deck_core::sync::{Direction, SyncEngine, SyncOptions};
use deck_core::{Error, SyncAuditLog};
use deck_store::{EntityKind, MemoryStore};
use deck_test_utils::{TestProject, stores};
use pretty_assertions::assert_eq;

fn host(store: &MemoryStore, name: &str) -> String {
    store.find(EntityKind::Service, name).unwrap()["host"]
        .as_str()
        .unwrap()
        .to_string()
}

// =============================================================================
// Mission 1: bring a drifted pair back in line
// =============================================================================

#[test]
fn mission_reconcile_a_drifted_pair() {
    let project = TestProject::new();
    let audit = SyncAuditLog::new(project.audit_dir());
    let (mut gateway, mut control_plane) = stores::mixed();
    let mut engine = SyncEngine::new(&mut gateway, &mut control_plane).with_audit(&audit);

    // 1. Inspect
    let totals = engine.status(&[], false).unwrap().totals();
    assert_eq!(totals.drift, 1);
    assert_eq!(totals.gateway_only, 1);
    assert_eq!(totals.control_plane_only, 1);

    // 2. Push what is new, leaving the drifted service alone
    let skip = SyncOptions {
        skip_conflicts: true,
        ..SyncOptions::default()
    };
    let pushed = engine.push(&skip, &mut AssumeYes).unwrap();
    let created: Vec<&str> = pushed.created.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(created, vec!["billing"]);
    assert_eq!(
        pushed.conflicts_skipped_message().as_deref(),
        Some("1 conflict(s) skipped")
    );
    assert_eq!(pushed.target_only.len(), 1);
    assert_eq!(pushed.target_only[0].key, "legacy");

    // 3. Let the control plane win everything else
    let force = SyncOptions {
        force: true,
        ..SyncOptions::default()
    };
    let pulled = engine.pull(&force, &mut AssumeYes).unwrap();
    assert!(pulled.is_success());
    assert_eq!(pulled.created.len(), 1);
    assert_eq!(pulled.updated.len(), 1);

    // 4. Nothing left to do
    assert!(engine.status(&[], false).unwrap().in_sync());
    drop(engine);
    assert_eq!(host(&gateway, "api"), "k.local");
    assert!(gateway.find(EntityKind::Service, "legacy").is_some());

    let history: Vec<Direction> = audit
        .entries()
        .unwrap()
        .into_iter()
        .map(|e| e.direction)
        .collect();
    assert_eq!(history, vec![Direction::Push, Direction::Pull]);
}

// =============================================================================
// Mission 2: undo a sync that went wrong
// =============================================================================

#[test]
fn mission_undo_a_forced_pull() {
    let project = TestProject::new();
    let audit = SyncAuditLog::new(project.audit_dir());
    let (mut gateway, mut control_plane) = stores::mixed();

    let force = SyncOptions {
        force: true,
        ..SyncOptions::default()
    };
    let pull_id = SyncEngine::new(&mut gateway, &mut control_plane)
        .with_audit(&audit)
        .pull(&force, &mut AssumeYes)
        .unwrap()
        .sync_id
        .expect("pull changed the gateway");
    assert_eq!(host(&gateway, "api"), "k.local");

    let preview = preview_rollback(&audit, &pull_id, Some(&gateway)).unwrap();
    assert!(preview.can_rollback, "warnings: {:?}", preview.warnings);
    assert_eq!(preview.operation.target(), deck_store::StoreRole::Gateway);

    let report = execute_rollback(&audit, &mut gateway, &preview).unwrap();
    assert_eq!(report.failed(), 0);
    assert_eq!(host(&gateway, "api"), "g.local");
    assert!(gateway.find(EntityKind::Service, "legacy").is_none());
    assert!(gateway.find(EntityKind::Service, "billing").is_some());

    // The control plane was never touched
    assert_eq!(host(&control_plane, "api"), "k.local");

    // The original pull is now superseded by its rollback
    let again = preview_rollback(&audit, &pull_id, Some(&gateway)).unwrap();
    assert!(!again.can_rollback);
    let refused = execute_rollback(&audit, &mut gateway, &again).unwrap_err();
    assert!(matches!(refused, Error::RollbackRefused { .. }));
}

// =============================================================================
// Mission 3: seed a new control plane from a dumped state file
// =============================================================================

#[test]
fn mission_seed_control_plane_from_a_dump() {
    let project = TestProject::new();
    let (gateway, _) = stores::gateway_only();
    let mut control_plane = MemoryStore::new(stores::CONTROL_PLANE);

    let state_file = project.root().join("kong.yaml");
    export(&gateway, &[], &ExportOptions::default())
        .unwrap()
        .save(&state_file)
        .unwrap();
    assert!(project.read_file("kong.yaml").contains("_format_version"));

    let desired = flatten(&DeclarativeConfig::load(&state_file).unwrap());
    let current = export(&control_plane, &[], &ExportOptions::default()).unwrap();
    let report = reconcile(&mut control_plane, &current, &desired, false).unwrap();

    assert_eq!(report.mode, ApplyMode::Incremental);
    assert_eq!(report.failed_count(), 0);
    assert_eq!(report.summary.total_changes(), 3);

    let mut gateway = gateway;
    let view = SyncEngine::new(&mut gateway, &mut control_plane)
        .status(&[], false)
        .unwrap();
    assert!(view.in_sync(), "{:?}", view.summary);
}

// =============================================================================
// Mission 4: a database-less Gateway is replaced wholesale
// =============================================================================

#[test]
fn mission_pull_into_a_dbless_gateway() {
    let mut gateway = MemoryStore::dbless(stores::GATEWAY);
    let mut control_plane = MemoryStore::new(stores::CONTROL_PLANE);
    stores::seed_api(&mut control_plane, "k.local");

    let report = SyncEngine::new(&mut gateway, &mut control_plane)
        .pull(&SyncOptions::default(), &mut AssumeYes)
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.mode, ApplyMode::Bulk);
    let document = gateway.last_config().expect("bulk config was submitted");
    assert_eq!(document["services"][0]["host"], "k.local");
}

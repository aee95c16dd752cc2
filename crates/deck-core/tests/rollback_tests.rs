//! Rollback of audited syncs

use deck_core::conflict::AssumeYes;
use deck_core::diff::Operation;
use deck_core::rollback::{execute_rollback, preview_rollback};
use deck_core::sync::{Direction, SyncEngine, SyncOptions};
use deck_core::{Error, SyncAuditLog};
use deck_store::{EntityKind, EntityStore, MemoryStore};
use deck_test_utils::stores;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn forced() -> SyncOptions {
    SyncOptions {
        force: true,
        ..SyncOptions::default()
    }
}

fn push(audit: &SyncAuditLog, gateway: &mut MemoryStore, control_plane: &mut MemoryStore) -> String {
    SyncEngine::new(gateway, control_plane)
        .with_audit(audit)
        .push(&forced(), &mut AssumeYes)
        .unwrap()
        .sync_id
        .expect("push changed something")
}

fn host(store: &MemoryStore) -> String {
    store.find(EntityKind::Service, "api").unwrap()["host"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn rollback_of_forced_update_restores_the_prior_state() {
    let temp = TempDir::new().unwrap();
    let audit = SyncAuditLog::new(temp.path());
    let (mut gateway, mut control_plane) = stores::drifted_service();
    let sync_id = push(&audit, &mut gateway, &mut control_plane);
    assert_eq!(host(&control_plane), "g.local");

    let preview = preview_rollback(&audit, &sync_id, Some(&control_plane)).unwrap();
    assert!(preview.can_rollback, "warnings: {:?}", preview.warnings);
    assert_eq!(preview.operation, Direction::Push);
    assert_eq!(preview.actions.len(), 1);
    assert_eq!(preview.actions[0].action, Operation::Update);

    let report = execute_rollback(&audit, &mut control_plane, &preview).unwrap();

    assert_eq!(report.restored(), 1);
    assert_eq!(report.failed(), 0);
    assert_eq!(host(&control_plane), "k.local");

    let rollback_id = report.sync_id.expect("rollback was audited");
    let entry = audit.entry(&rollback_id).unwrap().unwrap();
    assert_eq!(entry.rollback_of.as_deref(), Some(sync_id.as_str()));
    assert_eq!(entry.direction, Direction::Push);
}

#[test]
fn rollback_of_creates_deletes_in_reverse_dependency_order() {
    let temp = TempDir::new().unwrap();
    let audit = SyncAuditLog::new(temp.path());
    let (mut gateway, mut control_plane) = stores::gateway_only();
    let sync_id = push(&audit, &mut gateway, &mut control_plane);
    assert_eq!(control_plane.records(EntityKind::Plugin).len(), 1);

    let preview = preview_rollback(&audit, &sync_id, Some(&control_plane)).unwrap();
    assert!(preview.can_rollback, "warnings: {:?}", preview.warnings);
    assert!(preview.actions.iter().all(|a| a.action == Operation::Delete));

    let report = execute_rollback(&audit, &mut control_plane, &preview).unwrap();

    assert_eq!(report.restored(), 3);
    let kinds: Vec<EntityKind> = report.results.iter().map(|r| r.diff.entity_kind).collect();
    assert_eq!(
        kinds,
        vec![EntityKind::Plugin, EntityKind::Route, EntityKind::Service]
    );
    for kind in [EntityKind::Service, EntityKind::Route, EntityKind::Plugin] {
        assert!(control_plane.records(kind).is_empty());
    }
}

#[test]
fn rollback_is_refused_after_a_later_sync_touched_the_entity() {
    let temp = TempDir::new().unwrap();
    let audit = SyncAuditLog::new(temp.path());
    let (mut gateway, mut control_plane) = stores::gateway_only();
    let first = push(&audit, &mut gateway, &mut control_plane);

    gateway
        .patch(
            EntityKind::Service,
            "api",
            &json!({"host": "moved.local"}).as_object().cloned().unwrap(),
        )
        .unwrap();
    let second = push(&audit, &mut gateway, &mut control_plane);

    let preview = preview_rollback(&audit, &first, None).unwrap();

    assert!(!preview.can_rollback);
    assert!(
        preview.warnings.iter().any(|w| w.contains(&second)),
        "warnings: {:?}",
        preview.warnings
    );
    let err = execute_rollback(&audit, &mut control_plane, &preview).unwrap_err();
    assert!(matches!(err, Error::RollbackRefused { .. }));
    assert_eq!(host(&control_plane), "moved.local");
}

#[test]
fn rollback_is_refused_when_the_target_changed_since() {
    let temp = TempDir::new().unwrap();
    let audit = SyncAuditLog::new(temp.path());
    let (mut gateway, mut control_plane) = stores::drifted_service();
    let sync_id = push(&audit, &mut gateway, &mut control_plane);

    control_plane
        .patch(
            EntityKind::Service,
            "api",
            &json!({"host": "hand-edited.local"}).as_object().cloned().unwrap(),
        )
        .unwrap();

    let preview = preview_rollback(&audit, &sync_id, Some(&control_plane)).unwrap();

    assert!(!preview.can_rollback);
    assert!(
        preview.warnings.iter().any(|w| w.contains("changed since the sync")),
        "warnings: {:?}",
        preview.warnings
    );
}

#[test]
fn rollback_is_refused_when_the_entity_is_gone() {
    let temp = TempDir::new().unwrap();
    let audit = SyncAuditLog::new(temp.path());
    let mut gateway = MemoryStore::new(stores::GATEWAY)
        .with(EntityKind::Service, json!({"name": "solo", "host": "s.local"}));
    let mut control_plane = MemoryStore::new(stores::CONTROL_PLANE);
    let sync_id = push(&audit, &mut gateway, &mut control_plane);

    control_plane.delete(EntityKind::Service, "solo").unwrap();

    let preview = preview_rollback(&audit, &sync_id, Some(&control_plane)).unwrap();
    assert!(!preview.can_rollback);
    assert!(preview.warnings[0].contains("no longer exists"));
}

#[test]
fn unknown_sync_id_is_not_found() {
    let temp = TempDir::new().unwrap();
    let audit = SyncAuditLog::new(temp.path());

    let err = preview_rollback(&audit, "00000000-0000-4000-8000-000000000000", None).unwrap_err();
    assert!(matches!(err, Error::SyncNotFound { .. }));

    let err = preview_rollback(&audit, "not-a-uuid", None).unwrap_err();
    assert!(matches!(err, Error::SyncNotFound { .. }));
}

#[test]
fn pull_rollback_targets_the_gateway() {
    let temp = TempDir::new().unwrap();
    let audit = SyncAuditLog::new(temp.path());
    let (mut gateway, mut control_plane) = stores::drifted_service();
    let sync_id = SyncEngine::new(&mut gateway, &mut control_plane)
        .with_audit(&audit)
        .pull(&forced(), &mut AssumeYes)
        .unwrap()
        .sync_id
        .unwrap();
    assert_eq!(host(&gateway), "k.local");

    let preview = preview_rollback(&audit, &sync_id, Some(&gateway)).unwrap();
    assert_eq!(preview.operation, Direction::Pull);
    execute_rollback(&audit, &mut gateway, &preview).unwrap();

    assert_eq!(host(&gateway), "g.local");
}

#[test]
fn rollback_survives_an_unwritable_audit_log() {
    let temp = TempDir::new().unwrap();
    let audit = SyncAuditLog::new(temp.path().join("audit"));
    let (mut gateway, mut control_plane) = stores::drifted_service();
    let sync_id = push(&audit, &mut gateway, &mut control_plane);
    let preview = preview_rollback(&audit, &sync_id, Some(&control_plane)).unwrap();

    let blocked = temp.path().join("blocked");
    std::fs::write(&blocked, "not a directory").unwrap();
    let report = execute_rollback(&SyncAuditLog::new(&blocked), &mut control_plane, &preview).unwrap();

    assert_eq!(report.restored(), 1);
    assert_eq!(report.audit_errors.len(), 1);
    assert!(report.audit_errors[0].contains("service 'api'"));
    assert_eq!(report.sync_id, None);
    assert_eq!(host(&control_plane), "k.local");
}

//! Apply engine
//!
//! Executes a list of [`ConfigDiff`]s against one store. Creates and updates
//! run in ascending dependency rank, deletes in the exact reverse order. A
//! failing entity becomes a `failed` row; the rest of the plan still runs.
//!
//! Stores without per-entity writes (DB-less gateways) take the whole desired
//! document at once through [`sync_bulk`]; [`reconcile`] picks the path.

use deck_store::{EntityKind, EntityRecord, EntityStore, SubResource, record_id};
use serde::Serialize;
use serde_json::Value;

use crate::Result;
use crate::declarative::{DeclarativeConfig, FORMAT_VERSION_KEY};
use crate::diff::{ConfigDiff, ConfigDiffSummary, Operation, diff_configs};
use crate::export::{ExportOptions, export};
use crate::validate::validate_entity;

/// Outcome of one diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStatus {
    Success,
    Failed,
}

/// One row per executed diff
#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    pub diff: ConfigDiff,
    pub status: ApplyStatus,
    pub error: Option<String>,
    /// Document returned by the store; `None` for deletes and dry runs
    pub applied: Option<EntityRecord>,
}

impl ApplyResult {
    pub fn success(diff: ConfigDiff, applied: Option<EntityRecord>) -> Self {
        Self {
            diff,
            status: ApplyStatus::Success,
            error: None,
            applied,
        }
    }

    pub fn failed(diff: ConfigDiff, error: impl ToString) -> Self {
        Self {
            diff,
            status: ApplyStatus::Failed,
            error: Some(error.to_string()),
            applied: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ApplyStatus::Success
    }
}

/// How a reconcile reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    Incremental,
    Bulk,
}

/// Result of [`reconcile`]
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub mode: ApplyMode,
    pub summary: ConfigDiffSummary,
    pub results: Vec<ApplyResult>,
}

impl ReconcileReport {
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }
}

/// Diffs in execution order
pub fn order_diffs(diffs: &[ConfigDiff]) -> Vec<&ConfigDiff> {
    let (mut deletes, mut upserts): (Vec<&ConfigDiff>, Vec<&ConfigDiff>) = diffs
        .iter()
        .partition(|diff| diff.operation == Operation::Delete);
    upserts.sort_by_key(|diff| diff.entity_kind.rank());
    deletes.sort_by_key(|diff| diff.entity_kind.rank());
    deletes.reverse();
    upserts.extend(deletes);
    upserts
}

/// Execute diffs against one store
pub fn apply(store: &mut dyn EntityStore, diffs: &[ConfigDiff], dry_run: bool) -> Vec<ApplyResult> {
    let ordered = order_diffs(diffs);
    tracing::debug!(
        "Applying {} change(s) to {}{}",
        ordered.len(),
        store.label(),
        if dry_run { " (dry run)" } else { "" }
    );

    ordered
        .into_iter()
        .map(|diff| match apply_one(store, diff, dry_run) {
            Ok(applied) => ApplyResult::success(diff.clone(), applied),
            Err(e) => {
                tracing::debug!("{} {} '{}' failed: {}", diff.operation, diff.entity_kind, diff.key, e);
                ApplyResult::failed(diff.clone(), e)
            }
        })
        .collect()
}

fn apply_one(
    store: &mut dyn EntityStore,
    diff: &ConfigDiff,
    dry_run: bool,
) -> Result<Option<EntityRecord>> {
    let kind = diff.entity_kind;

    if diff.operation == Operation::Delete {
        if dry_run {
            return Ok(None);
        }
        store.delete(kind, &diff.id_or_name)?;
        tracing::info!("Deleted {} '{}' on {}", kind.singular(), diff.key, store.label());
        return Ok(None);
    }

    let Some(desired) = diff.desired.as_ref() else {
        return Err(crate::Error::InvalidOptions {
            message: format!("{} of '{}' carries no desired state", diff.operation, diff.key),
        });
    };
    validate_entity(kind, desired)?;
    if dry_run {
        return Ok(None);
    }

    let (payload, nested) = split_payload(kind, desired, diff.operation);
    let stored = match diff.operation {
        Operation::Create => store.create(kind, &payload)?,
        _ => store.update(kind, &diff.id_or_name, &payload)?,
    };
    tracing::info!(
        "{} {} '{}' on {}",
        match diff.operation {
            Operation::Create => "Created",
            _ => "Updated",
        },
        kind.singular(),
        diff.key,
        store.label()
    );

    let parent = record_id(&stored).unwrap_or(&diff.id_or_name).to_string();
    for (sub, records) in nested {
        submit_nested(store, kind, &parent, sub, records);
    }
    Ok(Some(stored))
}

/// Store payload plus the nested lists that go to sub-endpoints
///
/// Create payloads keep a client-supplied `id`; update payloads never carry one.
fn split_payload(
    kind: EntityKind,
    desired: &EntityRecord,
    operation: Operation,
) -> (EntityRecord, Vec<(SubResource, Vec<EntityRecord>)>) {
    let mut payload = desired.clone();
    payload.remove("created_at");
    payload.remove("updated_at");
    if operation != Operation::Create {
        payload.remove("id");
    }

    let mut nested = Vec::new();
    for sub in kind.info().nested {
        if let Some(Value::Array(items)) = payload.remove(sub.field()) {
            let records = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            nested.push((*sub, records));
        }
    }
    (payload, nested)
}

/// Submit nested records one by one; failures are logged and skipped
fn submit_nested(
    store: &mut dyn EntityStore,
    parent: EntityKind,
    parent_id: &str,
    sub: SubResource,
    records: Vec<EntityRecord>,
) {
    for mut record in records {
        for field in ["id", "created_at", "updated_at", sub.parent_field()] {
            record.remove(field);
        }
        let natural = record
            .get(sub.natural_key())
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .unwrap_or_default();
        match store.create_nested(parent, parent_id, sub, &record) {
            Ok(_) => tracing::debug!("Submitted {} '{}' under {}", sub, natural, parent_id),
            Err(e) => tracing::warn!(
                "Failed to submit {} '{}' under {} '{}': {}",
                sub,
                natural,
                parent.singular(),
                parent_id,
                e
            ),
        }
    }
}

/// Full declarative document as submitted to a bulk-replace endpoint
pub fn bulk_document(config: &DeclarativeConfig) -> Value {
    let mut document = config.to_value();
    if let Value::Object(root) = &mut document {
        root.retain(|key, _| key == FORMAT_VERSION_KEY || !key.starts_with('_'));
        for (key, list) in root.iter_mut() {
            if key == FORMAT_VERSION_KEY {
                continue;
            }
            if let Value::Array(items) = list {
                for item in items.iter_mut() {
                    if let Value::Object(record) = item {
                        record.retain(|field, _| {
                            !field.starts_with('_') && field != "created_at" && field != "updated_at"
                        });
                    }
                }
            }
        }
    }
    document
}

/// Replace the whole configuration of a store in one call
///
/// Returns the document that was (or, on a dry run, would be) submitted.
pub fn sync_bulk(store: &mut dyn EntityStore, config: &DeclarativeConfig, dry_run: bool) -> Result<Value> {
    for kind in config.kinds() {
        for entity in config.entities(kind) {
            validate_entity(kind, entity)?;
        }
    }
    let document = bulk_document(config);
    if dry_run {
        tracing::info!("Would replace configuration of {} ({} entities)", store.label(), config.len());
        return Ok(document);
    }
    store.replace_config(&document)?;
    tracing::info!("Replaced configuration of {} ({} entities)", store.label(), config.len());
    Ok(document)
}

/// Rows for a plan that went through the bulk endpoint
pub fn bulk_results(diffs: &[ConfigDiff], outcome: &Result<Value>) -> Vec<ApplyResult> {
    order_diffs(diffs)
        .into_iter()
        .map(|diff| match outcome {
            Ok(_) => ApplyResult::success(diff.clone(), diff.desired.clone()),
            Err(e) => ApplyResult::failed(diff.clone(), e),
        })
        .collect()
}

/// Apply a plan computed from a partial snapshot
///
/// Stores without per-entity writes get their full configuration exported,
/// the plan folded into it, and the result submitted in bulk.
pub fn apply_plan(
    store: &mut dyn EntityStore,
    diffs: &[ConfigDiff],
    dry_run: bool,
) -> Result<(ApplyMode, Vec<ApplyResult>)> {
    if store.supports_incremental_apply()? {
        return Ok((ApplyMode::Incremental, apply(store, diffs, dry_run)));
    }

    tracing::info!(
        "{} has no incremental API; folding the plan into its configuration",
        store.label()
    );
    let everything = ExportOptions {
        include_targets: true,
        include_credentials: true,
    };
    let mut folded = export(&*store, &[], &everything)?;
    folded.apply_diffs(diffs);
    let outcome = sync_bulk(store, &folded, dry_run);
    Ok((ApplyMode::Bulk, bulk_results(diffs, &outcome)))
}

/// Bring one store from `current` to `desired` by whichever path it supports
pub fn reconcile(
    store: &mut dyn EntityStore,
    current: &DeclarativeConfig,
    desired: &DeclarativeConfig,
    dry_run: bool,
) -> Result<ReconcileReport> {
    let summary = diff_configs(current, desired);

    if !store.supports_incremental_apply()? {
        tracing::info!("{} has no incremental API; using bulk replacement", store.label());
        let results = if summary.is_empty() {
            Vec::new()
        } else {
            let outcome = sync_bulk(store, desired, dry_run);
            bulk_results(&summary.diffs, &outcome)
        };
        return Ok(ReconcileReport {
            mode: ApplyMode::Bulk,
            summary,
            results,
        });
    }

    let results = apply(store, &summary.diffs, dry_run);
    Ok(ReconcileReport {
        mode: ApplyMode::Incremental,
        summary,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_store::{CredentialKind, MemoryStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> EntityRecord {
        value.as_object().cloned().unwrap()
    }

    fn create(kind: EntityKind, value: Value) -> ConfigDiff {
        ConfigDiff::create(kind, record(value))
    }

    fn delete(kind: EntityKind, value: Value) -> ConfigDiff {
        ConfigDiff::delete(kind, record(value))
    }

    #[test]
    fn upserts_ascend_and_deletes_descend_by_rank() {
        let diffs = vec![
            delete(EntityKind::Service, json!({"name": "old-svc"})),
            create(EntityKind::Plugin, json!({"name": "cors"})),
            delete(EntityKind::Plugin, json!({"name": "old-plugin"})),
            create(EntityKind::Service, json!({"name": "api"})),
            delete(EntityKind::Route, json!({"name": "old-route"})),
            create(EntityKind::Route, json!({"name": "r1"})),
        ];

        let order: Vec<(Operation, EntityKind)> = order_diffs(&diffs)
            .iter()
            .map(|d| (d.operation, d.entity_kind))
            .collect();

        assert_eq!(
            order,
            vec![
                (Operation::Create, EntityKind::Service),
                (Operation::Create, EntityKind::Route),
                (Operation::Create, EntityKind::Plugin),
                (Operation::Delete, EntityKind::Plugin),
                (Operation::Delete, EntityKind::Route),
                (Operation::Delete, EntityKind::Service),
            ]
        );
    }

    #[test]
    fn create_keeps_client_id_and_update_drops_it() {
        let mut store = MemoryStore::new("cp");
        let results = apply(
            &mut store,
            &[create(
                EntityKind::Service,
                json!({"id": "svc-1", "name": "api", "host": "a"}),
            )],
            false,
        );
        assert!(results[0].is_success());
        assert_eq!(record_id(&store.records(EntityKind::Service)[0]), Some("svc-1"));

        let current = store.records(EntityKind::Service)[0].clone();
        let update = ConfigDiff::update(
            EntityKind::Service,
            current,
            record(json!({"id": "other", "name": "api", "host": "b"})),
            Default::default(),
        );
        let results = apply(&mut store, &[update], false);
        assert!(results[0].is_success(), "{:?}", results[0].error);
        let stored = &store.records(EntityKind::Service)[0];
        assert_eq!(record_id(stored), Some("svc-1"));
        assert_eq!(stored["host"], json!("b"));
    }

    #[test]
    fn validation_failure_never_reaches_the_store() {
        let mut store = MemoryStore::new("gw");
        let results = apply(
            &mut store,
            &[create(EntityKind::Service, json!({"name": "api"}))],
            false,
        );

        assert_eq!(results[0].status, ApplyStatus::Failed);
        assert!(results[0].error.as_deref().unwrap().contains("host"));
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn failures_do_not_abort_the_plan() {
        let mut store = MemoryStore::new("gw");
        store.fail_on(EntityKind::Service, "bad", 500, "boom");
        let results = apply(
            &mut store,
            &[
                create(EntityKind::Service, json!({"name": "bad", "host": "h"})),
                create(EntityKind::Service, json!({"name": "good", "host": "h"})),
            ],
            false,
        );

        let statuses: Vec<ApplyStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ApplyStatus::Failed, ApplyStatus::Success]);
        assert!(store.find(EntityKind::Service, "good").is_some());
    }

    #[test]
    fn dry_run_makes_no_mutating_call() {
        let mut store = MemoryStore::new("gw").with(
            EntityKind::Service,
            json!({"id": "s1", "name": "old", "host": "h"}),
        );
        let results = apply(
            &mut store,
            &[
                create(EntityKind::Service, json!({"name": "api", "host": "h"})),
                delete(EntityKind::Service, json!({"id": "s1", "name": "old"})),
            ],
            true,
        );

        assert!(results.iter().all(ApplyResult::is_success));
        assert_eq!(store.mutation_count(), 0);
        assert_eq!(store.records(EntityKind::Service).len(), 1);
    }

    #[test]
    fn upstream_targets_go_to_the_nested_collection() {
        let mut store = MemoryStore::new("gw");
        store.fail_nested_on(SubResource::Targets, "bad:80", 400, "invalid target");
        let results = apply(
            &mut store,
            &[create(
                EntityKind::Upstream,
                json!({
                    "name": "up",
                    "targets": [
                        {"target": "a:80", "id": "t-1", "created_at": 1},
                        {"target": "bad:80"},
                        {"target": "c:80"}
                    ]
                }),
            )],
            false,
        );

        assert!(results[0].is_success());
        let upstream = store.find(EntityKind::Upstream, "up").unwrap();
        assert!(upstream.get("targets").is_none());

        let targets: Vec<Value> = store
            .nested_records(EntityKind::Upstream, "up", SubResource::Targets)
            .into_iter()
            .map(|t| t["target"].clone())
            .collect();
        assert_eq!(targets, vec![json!("a:80"), json!("c:80")]);
    }

    #[test]
    fn consumer_credentials_are_submitted_under_the_new_consumer() {
        let key_auth = SubResource::Credential(CredentialKind::KeyAuth);
        let acls = SubResource::Credential(CredentialKind::Acl);
        let mut store = MemoryStore::new("cp");
        store.fail_nested_on(acls, "blocked", 403, "forbidden group");
        let results = apply(
            &mut store,
            &[create(
                EntityKind::Consumer,
                json!({
                    "username": "alice",
                    "keyauth_credentials": [
                        {"key": "k1", "id": "x", "consumer": {"username": "bob"}}
                    ],
                    "acls": [{"group": "admins"}, {"group": "blocked"}]
                }),
            )],
            false,
        );

        assert!(results[0].is_success(), "{:?}", results[0].error);
        let consumer = store.find(EntityKind::Consumer, "alice").unwrap();
        let consumer_id = record_id(consumer).unwrap().to_string();
        assert!(consumer.get("keyauth_credentials").is_none());
        assert!(consumer.get("acls").is_none());

        let keys = store.nested_records(EntityKind::Consumer, "alice", key_auth);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0]["key"], json!("k1"));
        assert_ne!(keys[0]["id"], json!("x"));
        assert_eq!(keys[0]["consumer"], json!({"id": consumer_id}));

        let groups: Vec<Value> = store
            .nested_records(EntityKind::Consumer, "alice", acls)
            .into_iter()
            .map(|acl| acl["group"].clone())
            .collect();
        assert_eq!(groups, vec![json!("admins")]);
    }

    #[test]
    fn reconcile_uses_bulk_path_for_dbless_store() {
        let mut store = MemoryStore::dbless("gw");
        let desired = DeclarativeConfig::from_value(json!({
            "services": [{"name": "api", "host": "a", "created_at": 5, "_internal": true}]
        }))
        .unwrap();

        let report = reconcile(&mut store, &DeclarativeConfig::new(), &desired, false).unwrap();

        assert_eq!(report.mode, ApplyMode::Bulk);
        assert_eq!(report.failed_count(), 0);
        let submitted = store.last_config().unwrap();
        assert_eq!(submitted[FORMAT_VERSION_KEY], json!("3.0"));
        assert_eq!(submitted["services"], json!([{"name": "api", "host": "a"}]));
        assert_eq!(store.records(EntityKind::Service).len(), 1);
    }

    #[test]
    fn apply_plan_folds_into_existing_dbless_config() {
        let mut store = MemoryStore::dbless("gw");
        store.seed(EntityKind::Service, json!({"id": "s1", "name": "keep", "host": "k"}));
        store.seed(EntityKind::Service, json!({"id": "s2", "name": "api", "host": "old"}));
        let current = store.records(EntityKind::Service)[1].clone();

        let diffs = vec![
            create(EntityKind::Consumer, json!({"username": "alice"})),
            ConfigDiff::update(
                EntityKind::Service,
                current,
                record(json!({"name": "api", "host": "new"})),
                Default::default(),
            ),
        ];
        let (mode, results) = apply_plan(&mut store, &diffs, false).unwrap();

        assert_eq!(mode, ApplyMode::Bulk);
        assert!(results.iter().all(ApplyResult::is_success));
        assert_eq!(store.find(EntityKind::Service, "keep").unwrap()["host"], json!("k"));
        let api = store.find(EntityKind::Service, "api").unwrap();
        assert_eq!(api["host"], json!("new"));
        assert_eq!(record_id(api), Some("s2"));
        assert!(store.find(EntityKind::Consumer, "alice").is_some());
    }

    #[test]
    fn reconcile_is_a_no_op_when_states_match() {
        let mut store = MemoryStore::new("gw");
        let config = DeclarativeConfig::from_value(json!({
            "services": [{"name": "api", "host": "a"}]
        }))
        .unwrap();

        let report = reconcile(&mut store, &config, &config, false).unwrap();
        assert_eq!(report.mode, ApplyMode::Incremental);
        assert!(report.results.is_empty());
        assert_eq!(store.mutation_count(), 0);
    }
}

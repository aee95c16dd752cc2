//! Rollback of a recorded sync
//!
//! A rollback replays the inverse of every audited mutation:
//!
//! | recorded | inverse                      |
//! |----------|------------------------------|
//! | create   | delete                       |
//! | delete   | create from `before_state`   |
//! | update   | update back to `before_state`|
//!
//! It is refused when a later sync touched one of the same entities, or when
//! the live store no longer holds what the sync left behind.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use deck_store::{EntityKind, EntityRecord, EntityStore};
use serde::Serialize;
use serde_json::{Value, json};

use crate::Result;
use crate::apply::{ApplyMode, ApplyResult, apply_plan};
use crate::audit::{SyncAuditLog, SyncAuditRecord};
use crate::diff::{ConfigDiff, Operation, diff_entity, key_map};
use crate::error::Error;
use crate::export::{ExportOptions, export};
use crate::sync::Direction;

/// One inverse step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackAction {
    pub entity_type: EntityKind,
    pub entity_name: String,
    pub entity_id: Option<String>,
    /// What the rollback will do
    pub action: Operation,
    /// What the sync did
    pub original_action: Operation,
    /// State the sync left behind
    pub current_state: Option<EntityRecord>,
    /// State the rollback restores
    pub restore_state: Option<EntityRecord>,
}

impl RollbackAction {
    fn from_record(record: &SyncAuditRecord) -> Self {
        let action = match record.action {
            Operation::Create => Operation::Delete,
            Operation::Delete => Operation::Create,
            Operation::Update => Operation::Update,
        };
        Self {
            entity_type: record.entity_type,
            entity_name: record.entity_name.clone(),
            entity_id: record.entity_id.clone(),
            action,
            original_action: record.action,
            current_state: record.after_state.clone(),
            restore_state: record.before_state.clone(),
        }
    }

    /// The diff that performs this step
    pub fn to_diff(&self) -> Option<ConfigDiff> {
        let current = || {
            self.current_state.clone().unwrap_or_else(|| {
                let mut placeholder = EntityRecord::new();
                let address = self.entity_id.as_deref().unwrap_or(&self.entity_name);
                placeholder.insert("id".to_string(), json!(address));
                placeholder
            })
        };
        match self.action {
            Operation::Delete => Some(ConfigDiff::delete(self.entity_type, current())),
            Operation::Create => Some(ConfigDiff::create(
                self.entity_type,
                self.restore_state.clone()?,
            )),
            Operation::Update => {
                let current = current();
                let restore = self.restore_state.clone()?;
                let changes = diff_entity(&current, &restore).unwrap_or_default();
                Some(ConfigDiff::update(self.entity_type, current, restore, changes))
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} '{}'", self.entity_type.singular(), self.entity_name)
    }
}

/// What a rollback would do, and whether it is safe
#[derive(Debug, Clone, Serialize)]
pub struct RollbackPreview {
    pub sync_id: String,
    pub can_rollback: bool,
    /// Direction of the sync being rolled back
    pub operation: Direction,
    pub timestamp: DateTime<Utc>,
    pub warnings: Vec<String>,
    pub actions: Vec<RollbackAction>,
}

impl RollbackPreview {
    fn refuse(&mut self, warning: String) {
        tracing::warn!("{}", warning);
        self.can_rollback = false;
        self.warnings.push(warning);
    }
}

/// Outcome of an executed rollback
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub rollback_of: String,
    /// Sync id under which the rollback itself was recorded
    pub sync_id: Option<String>,
    pub mode: ApplyMode,
    pub results: Vec<ApplyResult>,
    /// Restored entities the audit log could not record
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audit_errors: Vec<String>,
}

impl RollbackReport {
    pub fn restored(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.restored()
    }
}

/// Compute the inverse plan of a sync
///
/// With `live`, the store the sync wrote to, each entity's current state is
/// compared against what the sync recorded.
pub fn preview_rollback(
    log: &SyncAuditLog,
    sync_id: &str,
    live: Option<&dyn EntityStore>,
) -> Result<RollbackPreview> {
    let records = log.records(sync_id)?;
    let Some(first) = records.first() else {
        return Err(Error::SyncNotFound {
            sync_id: sync_id.to_string(),
        });
    };
    let (operation, timestamp) = match log.entry(sync_id)? {
        Some(entry) => (entry.direction, entry.timestamp),
        None => (first.direction, first.timestamp),
    };

    let mut preview = RollbackPreview {
        sync_id: sync_id.to_string(),
        can_rollback: true,
        operation,
        timestamp,
        warnings: Vec::new(),
        actions: records.iter().rev().map(RollbackAction::from_record).collect(),
    };

    for action in &preview.actions.clone() {
        if action.action != Operation::Delete && action.restore_state.is_none() {
            preview.refuse(format!(
                "{} has no recorded prior state to restore",
                action.describe()
            ));
        }
    }

    let touched: BTreeSet<(EntityKind, &str)> = records
        .iter()
        .map(|r| (r.entity_type, r.entity_name.as_str()))
        .collect();
    let mut reported = BTreeSet::new();
    for later in log.records_after(sync_id)? {
        let key = (later.entity_type, later.entity_name.as_str());
        if touched.contains(&key) && reported.insert((later.entity_type, later.entity_name.clone()))
        {
            preview.refuse(format!(
                "{} '{}' was modified by later sync {}",
                later.entity_type.singular(),
                later.entity_name,
                later.sync_id
            ));
        }
    }

    if let Some(store) = live {
        check_live_state(store, &records, &mut preview)?;
    }

    tracing::debug!(
        "Rollback of {}: {} action(s), {} warning(s)",
        sync_id,
        preview.actions.len(),
        preview.warnings.len()
    );
    Ok(preview)
}

/// Compare what the sync left behind with what the store holds now
fn check_live_state(
    store: &dyn EntityStore,
    records: &[SyncAuditRecord],
    preview: &mut RollbackPreview,
) -> Result<()> {
    let has_field = |field: &str| {
        records.iter().any(|r| {
            [&r.before_state, &r.after_state]
                .into_iter()
                .flatten()
                .any(|state| state.contains_key(field))
        })
    };
    let options = ExportOptions {
        include_targets: has_field("targets"),
        include_credentials: EntityKind::Consumer
            .info()
            .nested
            .iter()
            .any(|sub| has_field(sub.field())),
    };
    let kinds: Vec<EntityKind> = records
        .iter()
        .map(|r| r.entity_type)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let snapshot = export(store, &kinds, &options)?;

    // the last record of an entity holds the state the sync left it in
    let mut expected: BTreeMap<(EntityKind, &str), &SyncAuditRecord> = BTreeMap::new();
    for record in records {
        expected.insert((record.entity_type, record.entity_name.as_str()), record);
    }

    for ((kind, name), record) in expected {
        let live = key_map(kind, snapshot.entities(kind));
        let current = live.get(name).copied();
        let label = format!("{} '{}'", kind.singular(), name);
        match (&record.after_state, current) {
            (Some(after), Some(current)) => {
                if let Some(changes) = diff_entity(current, after) {
                    let fields: Vec<&str> = changes.keys().map(String::as_str).collect();
                    preview.refuse(format!(
                        "{} changed since the sync ({})",
                        label,
                        fields.join(", ")
                    ));
                }
            }
            (Some(_), None) => preview.refuse(format!("{} no longer exists", label)),
            (None, Some(_)) if record.action == Operation::Delete => {
                preview.refuse(format!("{} was recreated after the sync", label))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Replay the inverse plan against the store the sync wrote to
///
/// The rollback is recorded as a new sync tagged with `rollback_of`.
pub fn execute_rollback(
    log: &SyncAuditLog,
    store: &mut dyn EntityStore,
    preview: &RollbackPreview,
) -> Result<RollbackReport> {
    if !preview.can_rollback {
        return Err(Error::RollbackRefused {
            sync_id: preview.sync_id.clone(),
            reason: preview.warnings.join("; "),
        });
    }

    let diffs: Vec<ConfigDiff> = preview
        .actions
        .iter()
        .filter_map(RollbackAction::to_diff)
        .collect();
    tracing::info!(
        "Rolling back {} ({} action(s)) on {}",
        preview.sync_id,
        diffs.len(),
        store.label()
    );
    let (mode, results) = apply_plan(store, &diffs, false)?;

    // the store is already changed, so audit failures are reported, not raised
    let mut session = log.begin(preview.operation, Some(preview.sync_id.clone()));
    let mut audit_errors = Vec::new();
    for result in results.iter().filter(|r| r.is_success()) {
        if let Err(e) = session.record_result(result) {
            let entity = format!("{} '{}'", result.diff.entity_kind.singular(), result.diff.key);
            tracing::warn!("Could not audit {}: {}", entity, e);
            audit_errors.push(format!("{entity}: {e}"));
        }
    }
    let sync_id = (session.recorded() > 0).then(|| session.sync_id().to_string());

    Ok(RollbackReport {
        rollback_of: preview.sync_id.clone(),
        sync_id,
        mode,
        results,
        audit_errors,
    })
}

/// Render a recorded state for display
pub fn state_summary(state: Option<&EntityRecord>) -> String {
    match state {
        Some(state) => Value::Object(state.clone()).to_string(),
        None => "(none)".to_string(),
    }
}

//! SyncEngine implementation
//!
//! One run walks the state machine
//!
//! ```text
//! PLANNING -> (no changes) DONE
//!          -> CONFIRMING (unless forced) -> (declined) CANCELLED
//!          -> CONFLICT_RESOLUTION (interactive only)
//!          -> APPLYING -> DONE
//! ```
//!
//! Entities only the target holds are reported and never deleted.

use std::collections::HashMap;

use deck_store::{EntityKind, EntityRecord, EntityStore, StoreRole};

use super::report::{DriftDetail, EntityRef, FailedEntity, SyncPhase, SyncReport};
use super::{Direction, SyncOptions};
use crate::Result;
use crate::apply::{ApplyResult, apply_plan};
use crate::audit::SyncAuditLog;
use crate::conflict::{Conflict, OperatorPrompt, Resolution, ResolutionAction};
use crate::diff::{ConfigDiff, Operation, diff_entity};
use crate::error::Error;
use crate::export::{ExportOptions, export};
use crate::unified::{UnifiedView, resolve};

/// Coordinates one Gateway and one control plane
pub struct SyncEngine<'a> {
    gateway: &'a mut dyn EntityStore,
    control_plane: &'a mut dyn EntityStore,
    audit: Option<&'a SyncAuditLog>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        gateway: &'a mut dyn EntityStore,
        control_plane: &'a mut dyn EntityStore,
    ) -> Self {
        Self {
            gateway,
            control_plane,
            audit: None,
        }
    }

    /// Record every successful mutation in this log
    pub fn with_audit(mut self, audit: &'a SyncAuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    fn store(&self, role: StoreRole) -> &(dyn EntityStore + 'a) {
        match role {
            StoreRole::Gateway => &*self.gateway,
            StoreRole::ControlPlane => &*self.control_plane,
        }
    }

    fn store_mut(&mut self, role: StoreRole) -> &mut (dyn EntityStore + 'a) {
        match role {
            StoreRole::Gateway => &mut *self.gateway,
            StoreRole::ControlPlane => &mut *self.control_plane,
        }
    }

    /// Unified view of both stores without changing anything
    pub fn status(&self, kinds: &[EntityKind], include_targets: bool) -> Result<UnifiedView> {
        let options = ExportOptions {
            include_targets,
            include_credentials: false,
        };
        let gateway = export(self.store(StoreRole::Gateway), kinds, &options)?;
        let control_plane = export(self.store(StoreRole::ControlPlane), kinds, &options)?;
        Ok(resolve(&gateway, &control_plane))
    }

    /// Copy Gateway state to the control plane
    pub fn push(
        &mut self,
        options: &SyncOptions,
        prompt: &mut dyn OperatorPrompt,
    ) -> Result<SyncReport> {
        self.run(Direction::Push, options, prompt)
    }

    /// Copy control-plane state to the Gateway
    pub fn pull(
        &mut self,
        options: &SyncOptions,
        prompt: &mut dyn OperatorPrompt,
    ) -> Result<SyncReport> {
        self.run(Direction::Pull, options, prompt)
    }

    /// Run the state machine in one direction
    ///
    /// # Errors
    ///
    /// Fails before planning on conflicting options, and after planning when
    /// drift exists and no policy says what to do with it. Entity-level
    /// failures are reported, not returned.
    pub fn run(
        &mut self,
        direction: Direction,
        options: &SyncOptions,
        prompt: &mut dyn OperatorPrompt,
    ) -> Result<SyncReport> {
        options.validate()?;
        let mut report = SyncReport::new(direction, options.dry_run);

        report.enter(SyncPhase::Planning);
        let export_options = ExportOptions {
            include_targets: options.include_targets,
            include_credentials: false,
        };
        let gateway = export(self.store(StoreRole::Gateway), &options.kinds, &export_options)?;
        let control_plane = export(
            self.store(StoreRole::ControlPlane),
            &options.kinds,
            &export_options,
        )?;
        let view = resolve(&gateway, &control_plane);

        let creates = plan(&view, direction, options, &mut report);
        report.planned = creates.clone();
        if options.force {
            report
                .planned
                .extend(report.conflicts.iter().filter_map(|c| update_diff(c, &c.source_state)));
        }
        tracing::debug!(
            "{} plan: {} create(s), {} conflict(s), {} target-only",
            direction,
            creates.len(),
            report.conflicts.len(),
            report.target_only.len()
        );

        if creates.is_empty() && report.conflicts.is_empty() {
            report.enter(SyncPhase::Done);
            return Ok(report);
        }

        if options.dry_run {
            if options.skip_conflicts {
                report.conflicts_skipped = report.conflicts.iter().map(conflict_ref).collect();
            }
            report.enter(SyncPhase::Done);
            return Ok(report);
        }

        if !report.conflicts.is_empty() && !options.has_conflict_policy() {
            return Err(Error::UnresolvedDrift {
                count: report.conflicts.len(),
            });
        }

        if !options.force {
            report.enter(SyncPhase::Confirming);
            let question = format!(
                "{} {} new entit(ies) and {} drifted entit(ies) from {} to {}?",
                capitalize(&direction.to_string()),
                creates.len(),
                report.conflicts.len(),
                direction.source(),
                direction.target()
            );
            if !prompt.confirm(&question)? {
                report.enter(SyncPhase::Cancelled);
                return Ok(report);
            }
        }

        let updates = self.resolve_conflicts(options, prompt, &mut report)?;
        let diffs: Vec<ConfigDiff> = creates.into_iter().chain(updates).collect();
        if diffs.is_empty() {
            report.enter(SyncPhase::Done);
            return Ok(report);
        }

        report.enter(SyncPhase::Applying);
        let (mode, results) = apply_plan(self.store_mut(direction.target()), &diffs, false)?;
        report.mode = mode;
        self.record(direction, &results, &mut report);

        if let Some(message) = report.conflicts_skipped_message() {
            tracing::info!("{}", message);
        }
        report.enter(SyncPhase::Done);
        Ok(report)
    }

    /// Turn conflicts into update diffs according to the chosen policy
    fn resolve_conflicts(
        &self,
        options: &SyncOptions,
        prompt: &mut dyn OperatorPrompt,
        report: &mut SyncReport,
    ) -> Result<Vec<ConfigDiff>> {
        if report.conflicts.is_empty() {
            return Ok(Vec::new());
        }

        if options.force {
            return Ok(report
                .conflicts
                .iter()
                .filter_map(|c| update_diff(c, &c.source_state))
                .collect());
        }

        if options.skip_conflicts {
            report.conflicts_skipped = report.conflicts.iter().map(conflict_ref).collect();
            return Ok(Vec::new());
        }

        report.enter(SyncPhase::ConflictResolution);
        let mut answers: HashMap<(EntityKind, String), Resolution> = prompt
            .resolve_conflicts(&report.conflicts)?
            .into_iter()
            .map(|r| ((r.conflict.entity_kind, r.conflict.key.clone()), r))
            .collect();

        let mut updates = Vec::new();
        for conflict in &report.conflicts {
            let entity = conflict_ref(conflict);
            let answer = answers.remove(&(conflict.entity_kind, conflict.key.clone()));
            match answer.as_ref().map(|r| (&r.action, r.state_to_apply())) {
                Some((_, Some(state))) => match update_diff(conflict, state) {
                    Some(diff) => updates.push(diff),
                    None => report.kept_target.push(entity),
                },
                Some((ResolutionAction::KeepTarget, None)) => report.kept_target.push(entity),
                _ => report.conflicts_skipped.push(entity),
            }
        }
        Ok(updates)
    }

    /// Tally results and audit every success
    ///
    /// The store has already been mutated, so an audit failure is attached to
    /// the report instead of aborting it.
    fn record(&self, direction: Direction, results: &[ApplyResult], report: &mut SyncReport) {
        let mut session = self.audit.map(|log| log.begin(direction, None));

        for result in results {
            let diff = &result.diff;
            let entity = EntityRef::new(diff.entity_kind, &diff.key);
            if !result.is_success() {
                report.failed.push(FailedEntity {
                    entity,
                    error: result.error.clone().unwrap_or_default(),
                });
                continue;
            }

            if let Some(session) = session.as_mut()
                && let Err(e) = session.record_result(result)
            {
                tracing::warn!("Could not audit {}: {}", entity, e);
                report.audit_errors.push(format!("{entity}: {e}"));
            }
            match diff.operation {
                Operation::Create => report.created.push(entity),
                Operation::Update => report.updated.push(entity),
                Operation::Delete => {}
            }
        }

        report.sync_id = session
            .filter(|s| s.recorded() > 0)
            .map(|s| s.sync_id().to_string());
    }
}

/// Classify every unified entity and return the creates
fn plan(
    view: &UnifiedView,
    direction: Direction,
    options: &SyncOptions,
    report: &mut SyncReport,
) -> Vec<ConfigDiff> {
    let mut creates = Vec::new();
    for entity in &view.entities {
        match (entity.side(direction.source()), entity.side(direction.target())) {
            (Some(source), None) => creates.push(ConfigDiff::create(entity.kind, source.clone())),
            (None, Some(_)) => report
                .target_only
                .push(EntityRef::new(entity.kind, &entity.key)),
            (Some(_), Some(_)) => {
                if let Some(conflict) = Conflict::from_unified(entity, direction) {
                    if options.with_drift {
                        report.drift.push(DriftDetail {
                            entity: conflict_ref(&conflict),
                            changes: conflict.changes.clone(),
                        });
                    }
                    report.conflicts.push(conflict);
                }
            }
            (None, None) => {}
        }
    }
    creates
}

/// Update of the target to `desired`; `None` when nothing would change
fn update_diff(conflict: &Conflict, desired: &EntityRecord) -> Option<ConfigDiff> {
    let changes = diff_entity(&conflict.target_state, desired)?;
    Some(ConfigDiff::update(
        conflict.entity_kind,
        conflict.target_state.clone(),
        desired.clone(),
        changes,
    ))
}

fn conflict_ref(conflict: &Conflict) -> EntityRef {
    EntityRef::new(conflict.entity_kind, &conflict.key)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

//! Conflicts between the two stores and how an operator resolves them

use std::collections::BTreeSet;

use deck_store::{EntityKind, EntityRecord, record_id, record_label};
use serde::Serialize;
use serde_json::Value;

use crate::Result;
use crate::diff::Changes;
use crate::sync::Direction;
use crate::unified::UnifiedEntity;

/// A drifted entity seen from the direction of a sync
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub entity_kind: EntityKind,
    /// Id of the entity on the target store
    pub entity_id: String,
    pub entity_name: String,
    /// Identity key shared by both sides
    pub key: String,
    pub direction: Direction,
    pub source_state: EntityRecord,
    pub target_state: EntityRecord,
    pub drift_fields: Vec<String>,
    /// Field detail, target value as `old` and source value as `new`
    pub changes: Changes,
}

impl Conflict {
    /// Build a conflict from a unified entity; `None` unless it drifted
    pub fn from_unified(entity: &UnifiedEntity, direction: Direction) -> Option<Self> {
        if !entity.has_drift {
            return None;
        }
        let source_state = entity.side(direction.source())?.clone();
        let target_state = entity.side(direction.target())?.clone();
        let changes = crate::diff::diff_entity(&target_state, &source_state).unwrap_or_default();

        Some(Self {
            entity_kind: entity.kind,
            entity_id: record_id(&target_state).unwrap_or(&entity.key).to_string(),
            entity_name: record_label(&target_state)
                .unwrap_or(&entity.key)
                .to_string(),
            key: entity.key.clone(),
            direction,
            source_state,
            target_state,
            drift_fields: entity.drift_fields.clone(),
            changes,
        })
    }

    /// Target state with the chosen fields taken from the source
    ///
    /// Fields absent from the source are removed from the result.
    pub fn merge_fields(&self, from_source: &BTreeSet<String>) -> EntityRecord {
        let mut merged = self.target_state.clone();
        for field in from_source {
            match self.source_state.get(field) {
                Some(value) if !value.is_null() => {
                    merged.insert(field.clone(), value.clone());
                }
                _ => {
                    merged.remove(field);
                }
            }
        }
        merged
    }
}

/// What to do with one conflict
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "merged_state", rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Overwrite the target with the source state
    KeepSource,
    /// Leave the target as it is
    KeepTarget,
    /// Write this exact state to the target
    Merge(EntityRecord),
    /// Leave the entity out of the plan
    Skip,
}

impl ResolutionAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::KeepSource => "keep source",
            Self::KeepTarget => "keep target",
            Self::Merge(_) => "merge",
            Self::Skip => "skip",
        }
    }
}

/// An operator's decision for one conflict
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub conflict: Conflict,
    pub action: ResolutionAction,
}

impl Resolution {
    pub fn new(conflict: Conflict, action: ResolutionAction) -> Self {
        Self { conflict, action }
    }

    pub fn merged_state(&self) -> Option<&EntityRecord> {
        match &self.action {
            ResolutionAction::Merge(state) => Some(state),
            _ => None,
        }
    }

    /// State to write to the target, if any
    pub fn state_to_apply(&self) -> Option<&EntityRecord> {
        match &self.action {
            ResolutionAction::KeepSource => Some(&self.conflict.source_state),
            ResolutionAction::Merge(state) => Some(state),
            ResolutionAction::KeepTarget | ResolutionAction::Skip => None,
        }
    }
}

/// The human in the loop of a sync
pub trait OperatorPrompt {
    /// Ask a yes/no question
    fn confirm(&mut self, message: &str) -> Result<bool>;

    /// Decide each conflict; conflicts left out of the answer are skipped
    fn resolve_conflicts(&mut self, conflicts: &[Conflict]) -> Result<Vec<Resolution>>;
}

/// Operator that answers every question without asking
///
/// Confirms everything and resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl OperatorPrompt for AssumeYes {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        tracing::debug!("Assuming yes: {}", message);
        Ok(true)
    }

    fn resolve_conflicts(&mut self, _conflicts: &[Conflict]) -> Result<Vec<Resolution>> {
        Ok(Vec::new())
    }
}

/// Render a state value for prompts and reports
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "(absent)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

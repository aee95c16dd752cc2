//! Report types for push and pull

use std::fmt;

use deck_store::EntityKind;
use serde::Serialize;

use super::Direction;
use crate::apply::ApplyMode;
use crate::conflict::Conflict;
use crate::diff::{Changes, ConfigDiff};

/// States of the sync state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Planning,
    Confirming,
    ConflictResolution,
    Applying,
    Done,
    Cancelled,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planning => "planning",
            Self::Confirming => "confirming",
            Self::ConflictResolution => "conflict resolution",
            Self::Applying => "applying",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Kind and identity key of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub key: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind.singular(), self.key)
    }
}

/// An entity the target store refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntity {
    pub entity: EntityRef,
    pub error: String,
}

/// Field-level drift of one entity, target value as `old`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftDetail {
    pub entity: EntityRef,
    pub changes: Changes,
}

/// What a push or pull did
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: Direction,
    pub dry_run: bool,
    /// Set once a mutation was audited
    pub sync_id: Option<String>,
    /// Phases visited, in order
    pub phases: Vec<SyncPhase>,
    pub mode: ApplyMode,
    /// Plan computed during planning, before conflict resolution
    pub planned: Vec<ConfigDiff>,
    pub conflicts: Vec<Conflict>,
    pub created: Vec<EntityRef>,
    pub updated: Vec<EntityRef>,
    /// Drifted entities left as the target has them
    pub kept_target: Vec<EntityRef>,
    /// Drifted entities left out of the plan
    pub conflicts_skipped: Vec<EntityRef>,
    /// Entities only the target holds; never deleted
    pub target_only: Vec<EntityRef>,
    pub failed: Vec<FailedEntity>,
    pub drift: Vec<DriftDetail>,
    /// Applied changes the audit log could not record
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audit_errors: Vec<String>,
}

impl SyncReport {
    pub fn new(direction: Direction, dry_run: bool) -> Self {
        Self {
            direction,
            dry_run,
            sync_id: None,
            phases: Vec::new(),
            mode: ApplyMode::Incremental,
            planned: Vec::new(),
            conflicts: Vec::new(),
            created: Vec::new(),
            updated: Vec::new(),
            kept_target: Vec::new(),
            conflicts_skipped: Vec::new(),
            target_only: Vec::new(),
            failed: Vec::new(),
            drift: Vec::new(),
            audit_errors: Vec::new(),
        }
    }

    pub fn enter(&mut self, phase: SyncPhase) {
        tracing::info!("{} {}", self.direction, phase);
        self.phases.push(phase);
    }

    /// Last phase reached
    pub fn phase(&self) -> Option<SyncPhase> {
        self.phases.last().copied()
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase() == Some(SyncPhase::Cancelled)
    }

    /// No entity failed and every applied change was audited
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.audit_errors.is_empty()
    }

    pub fn changed(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    /// `N conflict(s) skipped`, when any were
    pub fn conflicts_skipped_message(&self) -> Option<String> {
        if self.conflicts_skipped.is_empty() {
            None
        } else {
            Some(format!("{} conflict(s) skipped", self.conflicts_skipped.len()))
        }
    }
}

//! Reconciliation engine for decksync
//!
//! This crate keeps a Gateway and its control plane in agreement. It implements:
//!
//! - **Export**: normalized snapshots of one store as a [`DeclarativeConfig`]
//! - **Diff**: create/update/delete plans between two snapshots, keyed by
//!   identity rather than store-local ids
//! - **Apply**: dependency-ordered execution of a plan, incremental or bulk
//! - **Push / pull**: the [`SyncEngine`] state machine with drift detection and
//!   conflict resolution
//! - **Audit and rollback**: every mutation is recorded under a sync id and can
//!   be inverted later
//! - **Configuration**: layered TOML settings
//!
//! # Architecture
//!
//! ```text
//!                  deck-cli
//!                     |
//!                 deck-core
//!                     |
//!   +--------+--------+--------+---------+
//!   |        |        |        |         |
//! export    diff    apply    sync    rollback
//!   |                 |        |         |
//!   +------------+----+--------+---------+
//!                |
//!            deck-store
//! ```
//!
//! # Example
//!
//! ```ignore
//! use deck_core::{SyncAuditLog, SyncEngine, SyncOptions, AssumeYes};
//!
//! let audit = SyncAuditLog::new(settings.audit_dir.clone());
//! let mut engine = SyncEngine::new(&mut gateway, &mut control_plane).with_audit(&audit);
//! let report = engine.push(&SyncOptions::default(), &mut AssumeYes)?;
//! println!("{} entities changed", report.changed());
//! ```

pub mod apply;
pub mod audit;
pub mod config;
pub mod conflict;
pub mod declarative;
pub mod diff;
pub mod error;
pub mod export;
pub mod rollback;
pub mod sync;
pub mod unified;
pub mod validate;

pub use apply::{ApplyMode, ApplyResult, ApplyStatus, ReconcileReport, apply, apply_plan, reconcile, sync_bulk};
pub use audit::{AuditSession, SyncAuditLog, SyncAuditRecord, SyncEntry};
pub use config::{ConfigResolver, Manifest, Settings};
pub use conflict::{AssumeYes, Conflict, OperatorPrompt, Resolution, ResolutionAction};
pub use declarative::{DeclarativeConfig, FORMAT_VERSION};
pub use diff::{ConfigDiff, ConfigDiffSummary, FieldChange, Operation, diff_configs, diff_entity, entity_key};
pub use error::{Error, Result};
pub use export::{ExportOptions, export, flatten};
pub use rollback::{RollbackAction, RollbackPreview, RollbackReport, execute_rollback, preview_rollback};
pub use sync::{Direction, SyncEngine, SyncOptions, SyncPhase, SyncReport};
pub use unified::{Source, UnifiedEntity, UnifiedView, resolve};
pub use validate::validate_entity;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn error_config_not_found_displays_path() {
        let path = PathBuf::from("/path/to/deck.toml");
        let error = Error::ConfigNotFound { path };
        let display = error.to_string();
        assert!(display.contains("/path/to/deck.toml"), "got: {}", display);
    }

    #[test]
    fn unresolved_drift_names_the_policies() {
        let display = Error::UnresolvedDrift { count: 2 }.to_string();
        assert!(display.contains("2 drifted"));
        assert!(display.contains("--force"));
    }
}

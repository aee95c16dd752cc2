//! Push and pull between the Gateway and the control plane
//!
//! This module provides:
//! - **Direction**: which store is the source of a sync
//! - **SyncOptions**: the policy flags of one run
//! - **SyncEngine**: the planning/confirmation/resolution/apply state machine
//! - **SyncReport**: what a run did, phase by phase

mod engine;
mod report;

use std::fmt;

use deck_store::{EntityKind, StoreRole};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use engine::SyncEngine;
pub use report::{DriftDetail, EntityRef, FailedEntity, SyncPhase, SyncReport};

/// Which way a sync copies state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Gateway to control plane
    Push,
    /// Control plane to Gateway
    Pull,
}

impl Direction {
    pub fn source(self) -> StoreRole {
        match self {
            Self::Push => StoreRole::Gateway,
            Self::Pull => StoreRole::ControlPlane,
        }
    }

    pub fn target(self) -> StoreRole {
        self.source().opposite()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// Policy flags of one push or pull
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Kinds to sync; empty means every kind
    pub kinds: Vec<EntityKind>,
    /// Skip confirmation and overwrite drifted entities with the source state
    pub force: bool,
    /// Plan and report without confirming or mutating
    pub dry_run: bool,
    /// Leave drifted entities untouched
    pub skip_conflicts: bool,
    /// Ask the operator how to resolve each drifted entity
    pub interactive: bool,
    /// Report per-field drift detail
    pub with_drift: bool,
    /// Compare and copy upstream targets too
    pub include_targets: bool,
}

impl SyncOptions {
    /// Reject flag combinations that cannot be honoured
    pub fn validate(&self) -> Result<()> {
        if self.skip_conflicts && self.interactive {
            return Err(Error::InvalidOptions {
                message: "--skip-conflicts and --interactive cannot be used together".to_string(),
            });
        }
        Ok(())
    }

    /// Whether some flag says what to do with drift
    pub fn has_conflict_policy(&self) -> bool {
        self.force || self.skip_conflicts || self.interactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_copies_gateway_to_control_plane() {
        assert_eq!(Direction::Push.source(), StoreRole::Gateway);
        assert_eq!(Direction::Push.target(), StoreRole::ControlPlane);
        assert_eq!(Direction::Pull.target(), StoreRole::Gateway);
    }

    #[test]
    fn skip_and_interactive_are_exclusive() {
        let options = SyncOptions {
            skip_conflicts: true,
            interactive: true,
            ..SyncOptions::default()
        };
        let err = options.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidOptions { .. }));
        assert!(err.to_string().contains("--skip-conflicts"));
    }

    #[test]
    fn default_options_have_no_policy() {
        let options = SyncOptions::default();
        options.validate().unwrap();
        assert!(!options.has_conflict_policy());
    }
}

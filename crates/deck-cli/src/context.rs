//! Settings and stores for one invocation
//!
//! Settings are resolved once from the working directory; stores are built on
//! demand so commands that need only one store never require the other's
//! credentials.

use std::path::Path;

use deck_core::SyncAuditLog;
use deck_core::config::{ConfigResolver, Settings};
use deck_store::{EntityKind, HttpStore, StoreRole};

use crate::cli::ConnectionArgs;
use crate::error::Result;

/// Resolved settings of one invocation
#[derive(Debug, Clone)]
pub struct DeckContext {
    pub settings: Settings,
}

impl DeckContext {
    /// Resolve settings for `root`, with flags and environment applied last
    pub fn load(root: &Path, config: Option<&Path>, connection: &ConnectionArgs) -> Result<Self> {
        let mut resolver = ConfigResolver::new(root);
        if let Some(path) = config {
            resolver = resolver.with_config_file(path);
        }
        let settings = resolver.resolve_with(&connection.to_manifest())?;
        tracing::debug!(
            gateway = %settings.gateway_url,
            control_plane = %settings.control_plane_url,
            audit_dir = ?settings.audit_dir,
            "Resolved settings"
        );
        Ok(Self { settings })
    }

    /// Requested kinds, falling back to the configured default
    pub fn kinds(&self, requested: &[EntityKind]) -> Vec<EntityKind> {
        if requested.is_empty() {
            self.settings.types.clone()
        } else {
            requested.to_vec()
        }
    }

    pub fn gateway(&self) -> Result<HttpStore> {
        Ok(HttpStore::new(self.settings.gateway_store())?)
    }

    /// Fails before any request when credentials are missing
    pub fn control_plane(&self) -> Result<HttpStore> {
        Ok(HttpStore::new(self.settings.control_plane_store()?)?)
    }

    pub fn store(&self, role: StoreRole) -> Result<HttpStore> {
        match role {
            StoreRole::Gateway => self.gateway(),
            StoreRole::ControlPlane => self.control_plane(),
        }
    }

    pub fn audit_log(&self) -> SyncAuditLog {
        SyncAuditLog::new(&self.settings.audit_dir)
    }
}

//! Settings file schema

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Result;

/// `[gateway]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Admin API address, e.g. `http://localhost:8001`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Sent as `Kong-Admin-Token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// `[control_plane]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Personal access token, sent as a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Control plane id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// `[sync]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSection {
    /// Kinds synced when no `--type` is given
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Where the audit log lives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_dir: Option<PathBuf>,
}

/// One layer of settings as written in a TOML file
///
/// ```toml
/// [gateway]
/// url = "http://localhost:8001"
///
/// [control_plane]
/// url = "https://eu.api.konghq.com"
/// id = "9f1c..."
///
/// [sync]
/// types = ["services", "routes"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub control_plane: ControlPlaneSection,
    #[serde(default)]
    pub sync: SyncSection,
}

impl Manifest {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse one layer from TOML
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay `other` on top of this layer
    ///
    /// Every value `other` sets wins. `types` is replaced as a whole, never
    /// unioned, so a later layer can narrow the kinds.
    pub fn merge(&mut self, other: &Manifest) {
        overlay(&mut self.gateway.url, &other.gateway.url);
        overlay(&mut self.gateway.token, &other.gateway.token);
        overlay(&mut self.control_plane.url, &other.control_plane.url);
        overlay(&mut self.control_plane.token, &other.control_plane.token);
        overlay(&mut self.control_plane.id, &other.control_plane.id);
        overlay(&mut self.sync.audit_dir, &other.sync.audit_dir);
        if !other.sync.types.is_empty() {
            self.sync.types = other.sync.types.clone();
        }
    }
}

fn overlay<T: Clone>(base: &mut Option<T>, other: &Option<T>) {
    if other.is_some() {
        base.clone_from(other);
    }
}

//! Layered settings resolution
//!
//! Later layers override earlier ones:
//! 1. Global settings (`<config_dir>/decksync/config.toml`)
//! 2. Project settings (`deck.toml`, or the file given with `--config`)
//! 3. Local overrides (`deck.local.toml`)
//! 4. Command-line flags and environment variables, passed in by the caller

use std::fs;
use std::path::{Path, PathBuf};

use deck_store::{EntityKind, HttpStoreConfig};
use serde::Serialize;

use super::manifest::Manifest;
use crate::audit::SyncAuditLog;
use crate::error::{Error, Result};

pub const PROJECT_CONFIG: &str = "deck.toml";
pub const LOCAL_CONFIG: &str = "deck.local.toml";

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8001";
pub const DEFAULT_CONTROL_PLANE_URL: &str = "https://us.api.konghq.com";

/// Effective settings after every layer has been merged
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub gateway_url: String,
    #[serde(skip_serializing)]
    pub gateway_token: Option<String>,
    pub control_plane_url: String,
    #[serde(skip_serializing)]
    pub control_plane_token: Option<String>,
    pub control_plane_id: Option<String>,
    /// Default kinds; empty means every kind
    pub types: Vec<EntityKind>,
    pub audit_dir: PathBuf,
}

impl Settings {
    /// Turn a merged manifest into settings
    ///
    /// A relative `audit_dir` is taken relative to `root`.
    pub fn from_manifest(manifest: Manifest, root: &Path) -> Result<Self> {
        let types = manifest
            .sync
            .types
            .iter()
            .map(|t| t.parse::<EntityKind>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let audit_dir = match manifest.sync.audit_dir {
            Some(dir) if dir.is_relative() => root.join(dir),
            Some(dir) => dir,
            None => SyncAuditLog::default_dir().unwrap_or_else(|| root.join(".decksync/audit")),
        };

        Ok(Self {
            gateway_url: manifest
                .gateway
                .url
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            gateway_token: manifest.gateway.token,
            control_plane_url: manifest
                .control_plane
                .url
                .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_URL.to_string()),
            control_plane_token: manifest.control_plane.token,
            control_plane_id: manifest.control_plane.id,
            types,
            audit_dir,
        })
    }

    /// Connection settings for the Gateway admin API
    pub fn gateway_store(&self) -> HttpStoreConfig {
        let config = HttpStoreConfig::gateway(&self.gateway_url);
        match &self.gateway_token {
            Some(token) => config.with_token(token),
            None => config,
        }
    }

    /// Connection settings for the control plane
    ///
    /// Fails when the control plane id or token is missing.
    pub fn control_plane_store(&self) -> Result<HttpStoreConfig> {
        let mut missing = Vec::new();
        if self.control_plane_id.is_none() {
            missing.push("control_plane.id (DECK_CONTROL_PLANE_ID)");
        }
        if self.control_plane_token.is_none() {
            missing.push("control_plane.token (DECK_CONTROL_PLANE_TOKEN)");
        }
        match (&self.control_plane_id, &self.control_plane_token) {
            (Some(id), Some(token)) => {
                Ok(HttpStoreConfig::control_plane(&self.control_plane_url, id).with_token(token))
            }
            _ => Err(Error::MissingConfig {
                message: format!("control plane credentials not set: {}", missing.join(", ")),
            }),
        }
    }
}

/// Resolves [`Settings`] for a project directory
pub struct ConfigResolver {
    /// Project directory holding `deck.toml`
    root: PathBuf,

    /// Replaces `deck.toml` when set
    config_file: Option<PathBuf>,

    /// Override for the global config directory (used for testing).
    /// When `None`, `dirs::config_dir()` is used.
    global_config_dir_override: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_file: None,
            global_config_dir_override: None,
        }
    }

    /// Create a resolver with a custom global config directory
    pub fn with_global_config_dir(root: impl Into<PathBuf>, global_config_dir: PathBuf) -> Self {
        Self {
            global_config_dir_override: Some(global_config_dir),
            ..Self::new(root)
        }
    }

    /// Read project settings from `path` instead of `deck.toml`
    ///
    /// Unlike the default project file, this one must exist.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref override_dir) = self.global_config_dir_override {
            return Some(override_dir.clone());
        }
        dirs::config_dir().map(|d| d.join("decksync"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Merge the file layers into one manifest
    pub fn load(&self) -> Result<Manifest> {
        let mut manifest = Manifest::empty();

        // Layer 1 - Global settings
        if let Some(global_dir) = self.global_config_dir() {
            let global_config_path = global_dir.join("config.toml");
            if global_config_path.is_file() {
                tracing::debug!(?global_config_path, "Loading global config (layer 1)");
                manifest.merge(&read_layer(&global_config_path)?);
            } else {
                tracing::debug!(?global_config_path, "No global config found (layer 1)");
            }
        }

        // Layer 2 - Project settings
        match &self.config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(Error::ConfigNotFound { path: path.clone() });
                }
                tracing::debug!(?path, "Loading config file (layer 2)");
                manifest.merge(&read_layer(path)?);
            }
            None => {
                let project_config_path = self.root.join(PROJECT_CONFIG);
                if project_config_path.is_file() {
                    tracing::debug!(?project_config_path, "Loading project config (layer 2)");
                    manifest.merge(&read_layer(&project_config_path)?);
                }
            }
        }

        // Layer 3 - Local overrides
        let local_config_path = self.root.join(LOCAL_CONFIG);
        if local_config_path.is_file() {
            tracing::debug!(?local_config_path, "Loading local config (layer 3)");
            manifest.merge(&read_layer(&local_config_path)?);
        }

        Ok(manifest)
    }

    /// Resolve settings with no command-line overrides
    pub fn resolve(&self) -> Result<Settings> {
        self.resolve_with(&Manifest::empty())
    }

    /// Resolve settings with `overrides` applied as the last layer
    pub fn resolve_with(&self, overrides: &Manifest) -> Result<Settings> {
        let mut manifest = self.load()?;
        manifest.merge(overrides);
        Settings::from_manifest(manifest, &self.root)
    }
}

fn read_layer(path: &Path) -> Result<Manifest> {
    let content = fs::read_to_string(path)?;
    Manifest::parse(&content).map_err(|e| Error::InvalidConfig {
        message: format!("{}: {}", path.display(), e),
    })
}

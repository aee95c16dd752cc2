//! Error types for deck-core

use std::path::PathBuf;

/// Result type for deck-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in deck-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// A required setting is missing
    #[error("Missing configuration: {message}")]
    MissingConfig { message: String },

    /// Conflicting or malformed sync options
    #[error("Invalid options: {message}")]
    InvalidOptions { message: String },

    /// A desired entity failed local shape checks
    #[error("Validation failed for {kind} '{key}': {message}")]
    Validation {
        kind: String,
        key: String,
        message: String,
    },

    /// Drift exists and no resolution policy was chosen
    #[error(
        "{count} drifted entity(ies) found; rerun with --force, --skip-conflicts or --interactive"
    )]
    UnresolvedDrift { count: usize },

    /// A declarative state document could not be read
    #[error("Invalid declarative config: {message}")]
    InvalidConfig { message: String },

    /// Error in audit log operations
    #[error("Audit log error: {message}")]
    Audit { message: String },

    /// No audit records exist for a sync id
    #[error("Sync not found: {sync_id}")]
    SyncNotFound { sync_id: String },

    /// Rollback cannot be executed safely
    #[error("Rollback of {sync_id} refused: {reason}")]
    RollbackRefused { sync_id: String, reason: String },

    /// Error from the entity store layer
    #[error(transparent)]
    Store(#[from] deck_store::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

//! The EntityStore contract
//!
//! Both the Gateway admin API and the control-plane API expose this identical
//! contract. Every call is blocking; an absent entity is `Ok(None)` from
//! [`EntityStore::get`], never an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::kind::{EntityKind, SubResource};
use crate::record::EntityRecord;

/// Which side of a synchronization a store plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRole {
    /// The locally reachable admin API
    Gateway,
    /// The cloud control plane
    ControlPlane,
}

impl StoreRole {
    /// The role on the other side of a sync
    pub fn opposite(self) -> Self {
        match self {
            Self::Gateway => Self::ControlPlane,
            Self::ControlPlane => Self::Gateway,
        }
    }
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway => write!(f, "gateway"),
            Self::ControlPlane => write!(f, "control plane"),
        }
    }
}

/// Restricts a listing to the children of one parent entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Kind of the parent entity
    pub parent: EntityKind,
    /// Parent id or name
    pub id_or_name: String,
}

impl Scope {
    pub fn new(parent: EntityKind, id_or_name: impl Into<String>) -> Self {
        Self {
            parent,
            id_or_name: id_or_name.into(),
        }
    }
}

/// Blocking CRUD over one entity kind at a time
pub trait EntityStore {
    /// Short label used in logs and reports
    fn label(&self) -> &str;

    /// List every entity of a kind, optionally scoped to a parent
    fn list(&self, kind: EntityKind, scope: Option<&Scope>) -> Result<Vec<EntityRecord>>;

    /// Fetch one entity; `Ok(None)` when it does not exist
    fn get(&self, kind: EntityKind, id_or_name: &str) -> Result<Option<EntityRecord>>;

    /// Create an entity, returning the stored document
    fn create(&mut self, kind: EntityKind, body: &EntityRecord) -> Result<EntityRecord>;

    /// Replace an entity
    fn update(
        &mut self,
        kind: EntityKind,
        id_or_name: &str,
        body: &EntityRecord,
    ) -> Result<EntityRecord>;

    /// Partially update an entity
    fn patch(
        &mut self,
        kind: EntityKind,
        id_or_name: &str,
        body: &EntityRecord,
    ) -> Result<EntityRecord>;

    /// Delete an entity
    fn delete(&mut self, kind: EntityKind, id_or_name: &str) -> Result<()>;

    /// List a nested sub-collection such as an upstream's targets
    fn list_nested(
        &self,
        parent: EntityKind,
        parent_id: &str,
        sub: SubResource,
    ) -> Result<Vec<EntityRecord>>;

    /// Submit one record to a nested sub-collection
    fn create_nested(
        &mut self,
        parent: EntityKind,
        parent_id: &str,
        sub: SubResource,
        body: &EntityRecord,
    ) -> Result<EntityRecord>;

    /// Whether the store accepts per-entity writes
    ///
    /// DB-less gateways answer `false` and only accept [`EntityStore::replace_config`].
    fn supports_incremental_apply(&self) -> Result<bool> {
        Ok(true)
    }

    /// Replace the whole configuration with one declarative document
    fn replace_config(&mut self, _document: &Value) -> Result<()> {
        Err(Error::Unsupported {
            store: self.label().to_string(),
            operation: "bulk config replacement".to_string(),
        })
    }
}

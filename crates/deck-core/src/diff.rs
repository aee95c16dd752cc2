//! Diff engine
//!
//! Pure functions computing create/update/delete operations between two
//! snapshots. Entities are paired by identity key, never by server id alone:
//!
//! - scoped entities (plugins): `name@scope:parent[&scope:parent...]`
//! - everything else: `username` > `name` > `id` > content hash

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use deck_store::{EntityKind, EntityRecord, record_id, record_label, reference_label};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::declarative::DeclarativeConfig;

/// Fields assigned by the server; never compared
pub const IGNORED_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Parent references that scope a plugin, in key order
const SCOPE_FIELDS: [&str; 4] = ["service", "route", "consumer", "consumer_group"];

static NULL: Value = Value::Null;

/// Kind of mutation a diff asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Old and new value of one field; absent fields read as null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Field-level differences keyed by field name
pub type Changes = BTreeMap<String, FieldChange>;

/// One operation needed to turn the current state into the desired state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDiff {
    pub entity_kind: EntityKind,
    pub operation: Operation,
    /// How the store addresses the entity
    pub id_or_name: String,
    /// Identity key the entity was paired by
    pub key: String,
    pub current: Option<EntityRecord>,
    pub desired: Option<EntityRecord>,
    pub changes: Changes,
}

impl ConfigDiff {
    pub fn create(kind: EntityKind, desired: EntityRecord) -> Self {
        let key = entity_key(&desired, Some(kind));
        Self {
            entity_kind: kind,
            operation: Operation::Create,
            id_or_name: address(&desired, &key),
            key,
            current: None,
            desired: Some(desired),
            changes: Changes::new(),
        }
    }

    pub fn update(
        kind: EntityKind,
        current: EntityRecord,
        desired: EntityRecord,
        changes: Changes,
    ) -> Self {
        let key = entity_key(&current, Some(kind));
        Self {
            entity_kind: kind,
            operation: Operation::Update,
            id_or_name: address(&current, &key),
            key,
            current: Some(current),
            desired: Some(desired),
            changes,
        }
    }

    pub fn delete(kind: EntityKind, current: EntityRecord) -> Self {
        let key = entity_key(&current, Some(kind));
        Self {
            entity_kind: kind,
            operation: Operation::Delete,
            id_or_name: address(&current, &key),
            key,
            current: Some(current),
            desired: None,
            changes: Changes::new(),
        }
    }
}

/// Aggregate counts plus the full diff list
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigDiffSummary {
    pub creates: BTreeMap<EntityKind, usize>,
    pub updates: BTreeMap<EntityKind, usize>,
    pub deletes: BTreeMap<EntityKind, usize>,
    pub diffs: Vec<ConfigDiff>,
}

impl ConfigDiffSummary {
    pub fn from_diffs(diffs: Vec<ConfigDiff>) -> Self {
        let mut summary = Self::default();
        for diff in &diffs {
            let counter = match diff.operation {
                Operation::Create => &mut summary.creates,
                Operation::Update => &mut summary.updates,
                Operation::Delete => &mut summary.deletes,
            };
            *counter.entry(diff.entity_kind).or_default() += 1;
        }
        summary.diffs = diffs;
        summary
    }

    pub fn total_changes(&self) -> usize {
        self.creates.values().sum::<usize>()
            + self.updates.values().sum::<usize>()
            + self.deletes.values().sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }
}

/// Deterministic identity key of an entity
///
/// Without a kind, a document with a string `name` and an object `config`
/// is treated as a plugin.
pub fn entity_key(entity: &EntityRecord, kind: Option<EntityKind>) -> String {
    let scoped = match kind {
        Some(kind) => kind.is_scoped(),
        None => looks_scoped(entity),
    };
    if scoped {
        return scoped_key(entity);
    }

    for field in ["username", "name", "id"] {
        if let Some(value) = entity.get(field).and_then(Value::as_str)
            && !value.is_empty()
        {
            return value.to_string();
        }
    }
    content_key(entity)
}

fn looks_scoped(entity: &EntityRecord) -> bool {
    entity.get("name").is_some_and(Value::is_string)
        && entity.get("config").is_some_and(Value::is_object)
}

fn scoped_key(entity: &EntityRecord) -> String {
    let name = entity
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unnamed");
    let scopes: Vec<String> = SCOPE_FIELDS
        .iter()
        .filter_map(|field| {
            entity
                .get(*field)
                .and_then(reference_label)
                .map(|parent| format!("{field}:{parent}"))
        })
        .collect();

    if !scopes.is_empty() {
        format!("{name}@{}", scopes.join("&"))
    } else if let Some(id) = record_id(entity) {
        id.to_string()
    } else {
        format!("{name}@global")
    }
}

/// Hash of the comparable fields, for entities with no name or id
fn content_key(entity: &EntityRecord) -> String {
    let comparable: serde_json::Map<String, Value> = entity
        .iter()
        .filter(|(field, _)| !IGNORED_FIELDS.contains(&field.as_str()))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(Value::Object(comparable).to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("hash:{}", &digest[..16])
}

/// How a store addresses an entity: its id, else its label, else its key
fn address(entity: &EntityRecord, key: &str) -> String {
    record_id(entity)
        .or_else(|| record_label(entity))
        .unwrap_or(key)
        .to_string()
}

/// Field-level comparison ignoring server-assigned fields
///
/// Returns `None` when no comparable field differs.
pub fn diff_entity(current: &EntityRecord, desired: &EntityRecord) -> Option<Changes> {
    let fields: BTreeSet<&String> = current
        .keys()
        .chain(desired.keys())
        .filter(|field| !IGNORED_FIELDS.contains(&field.as_str()))
        .collect();

    let mut changes = Changes::new();
    for field in fields {
        let old = current.get(field).unwrap_or(&NULL);
        let new = desired.get(field).unwrap_or(&NULL);
        if old != new {
            changes.insert(
                field.clone(),
                FieldChange {
                    old: old.clone(),
                    new: new.clone(),
                },
            );
        }
    }

    if changes.is_empty() {
        None
    } else {
        Some(changes)
    }
}

/// Index entities by identity key; later duplicates win
pub fn key_map(kind: EntityKind, entities: &[EntityRecord]) -> BTreeMap<String, &EntityRecord> {
    let mut map = BTreeMap::new();
    for entity in entities {
        let key = entity_key(entity, Some(kind));
        if map.insert(key.clone(), entity).is_some() {
            tracing::warn!("Duplicate {} key '{}'; keeping the last one", kind, key);
        }
    }
    map
}

/// Operations turning `current` into `desired` for one kind
pub fn diff_entity_list(
    kind: EntityKind,
    current: &[EntityRecord],
    desired: &[EntityRecord],
) -> Vec<ConfigDiff> {
    let current_by_key = key_map(kind, current);
    let desired_by_key = key_map(kind, desired);
    let mut diffs = Vec::new();

    for (key, wanted) in &desired_by_key {
        match current_by_key.get(key) {
            None => diffs.push(ConfigDiff::create(kind, (*wanted).clone())),
            Some(existing) => {
                if let Some(changes) = diff_entity(existing, wanted) {
                    diffs.push(ConfigDiff::update(
                        kind,
                        (*existing).clone(),
                        (*wanted).clone(),
                        changes,
                    ));
                }
            }
        }
    }

    for (key, existing) in &current_by_key {
        if !desired_by_key.contains_key(key) {
            diffs.push(ConfigDiff::delete(kind, (*existing).clone()));
        }
    }

    tracing::debug!("{}: {} change(s)", kind, diffs.len());
    diffs
}

/// Diff every kind present in either config
pub fn diff_configs(current: &DeclarativeConfig, desired: &DeclarativeConfig) -> ConfigDiffSummary {
    let kinds: BTreeSet<EntityKind> = current.kinds().chain(desired.kinds()).collect();
    let diffs = kinds
        .into_iter()
        .flat_map(|kind| diff_entity_list(kind, current.entities(kind), desired.entities(kind)))
        .collect();
    ConfigDiffSummary::from_diffs(diffs)
}

//! State export and flattening
//!
//! Turns whatever a store or a state file holds into flat per-kind lists:
//!
//! 1. children embedded in a parent document (routes in a service, plugins in
//!    a route) move to their own top-level list with a parent reference
//! 2. id-only references are rewritten to the referenced entity's name so
//!    both stores describe the same relation the same way
//! 3. timestamps and null fields are dropped; nested targets and credentials
//!    lose their server fields and are sorted, empty lists are omitted

use std::collections::{BTreeMap, BTreeSet};

use deck_store::{EntityKind, EntityRecord, EntityStore, SubResource, record_id, record_label};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::Result;
use crate::declarative::DeclarativeConfig;
use crate::diff::entity_key;

/// Timestamps the server owns
const SERVER_TIMESTAMPS: [&str; 2] = ["created_at", "updated_at"];

/// What to embed beyond the top-level entity lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Embed each upstream's targets under `targets`
    pub include_targets: bool,
    /// Embed each consumer's credentials under their declarative fields
    pub include_credentials: bool,
}

impl ExportOptions {
    fn includes(&self, sub: SubResource) -> bool {
        match sub {
            SubResource::Targets => self.include_targets,
            SubResource::Credential(_) => self.include_credentials,
        }
    }

    /// Drop nested fields an export with these options would leave out
    ///
    /// A state file compared against an export has to go through this first,
    /// or every embedded list the export skipped shows up as a change.
    pub fn retain_included(&self, config: &DeclarativeConfig) -> DeclarativeConfig {
        let mut out = config.clone();
        for kind in config.kinds() {
            for sub in kind.info().nested.iter().filter(|sub| !self.includes(**sub)) {
                let mut dropped = 0;
                for record in out.entities_mut(kind) {
                    dropped += usize::from(record.remove(sub.field()).is_some());
                }
                if dropped > 0 {
                    tracing::info!(
                        "Ignoring `{}` on {} {} (not included in this comparison)",
                        sub.field(),
                        dropped,
                        kind
                    );
                }
            }
        }
        out
    }
}

/// Requested kinds in dependency-rank order; empty means every kind
pub fn resolve_kinds(kinds: &[EntityKind]) -> Vec<EntityKind> {
    if kinds.is_empty() {
        return EntityKind::ALL.to_vec();
    }
    let set: BTreeSet<EntityKind> = kinds.iter().copied().collect();
    set.into_iter().collect()
}

/// Pull a normalized snapshot of the given kinds from one store
pub fn export(
    store: &dyn EntityStore,
    kinds: &[EntityKind],
    options: &ExportOptions,
) -> Result<DeclarativeConfig> {
    let kinds = resolve_kinds(kinds);
    let mut raw = DeclarativeConfig::new();

    for kind in &kinds {
        let records = store.list(*kind, None)?;
        tracing::debug!("Listed {} {} from {}", records.len(), kind, store.label());
        for mut record in records {
            for sub in kind.info().nested {
                record.remove(sub.field());
                if !options.includes(*sub) {
                    continue;
                }
                let Some(parent) = record_id(&record).or_else(|| record_label(&record)) else {
                    continue;
                };
                let children = store.list_nested(*kind, parent, *sub)?;
                if !children.is_empty() {
                    record.insert(
                        sub.field().to_string(),
                        Value::Array(canonical_nested(*sub, children)),
                    );
                }
            }
            raw.push(*kind, record);
        }
    }

    let flat = extract_children(&raw);
    let mut index = ReferenceIndex::from_config(&flat);
    for referenced in referenced_kinds(&flat) {
        if !kinds.contains(&referenced) {
            index.add_all(referenced, &store.list(referenced, None)?);
        }
    }

    let config = clean(&flat, &index).restrict(&kinds);
    tracing::info!("Exported {} entities from {}", config.len(), store.label());
    Ok(config)
}

/// Apply the export normalization to a document read from disk
pub fn flatten(config: &DeclarativeConfig) -> DeclarativeConfig {
    let flat = extract_children(config);
    let index = ReferenceIndex::from_config(&flat);
    clean(&flat, &index).with_format_version(config.format_version())
}

/// Strip server fields from nested records and sort them canonically
pub fn canonical_nested(sub: SubResource, records: Vec<EntityRecord>) -> Vec<Value> {
    let mut stripped: Vec<EntityRecord> = records
        .into_iter()
        .map(|mut record| {
            for field in ["id", "created_at", "updated_at", sub.parent_field()] {
                record.remove(field);
            }
            record.retain(|_, value| !value.is_null());
            record
        })
        .collect();
    stripped.sort_by_cached_key(|record| {
        let natural = record
            .get(sub.natural_key())
            .map(Value::to_string)
            .unwrap_or_default();
        (natural, Value::Object(record.clone()).to_string())
    });
    stripped.into_iter().map(Value::Object).collect()
}

/// Move embedded children to their own lists, injecting parent references
fn extract_children(config: &DeclarativeConfig) -> DeclarativeConfig {
    let mut out = DeclarativeConfig::new();
    for kind in config.kinds() {
        for record in config.entities(kind) {
            extract(kind, record.clone(), &mut out);
        }
    }
    out
}

fn extract(kind: EntityKind, mut record: EntityRecord, out: &mut DeclarativeConfig) {
    for child in kind.info().children {
        let Some(Value::Array(items)) = record.remove(child.plural()) else {
            continue;
        };
        let reference = parent_reference(kind, &record);
        for item in items {
            let Value::Object(mut child_record) = item else {
                continue;
            };
            if let (Some(field), Some(reference)) = (kind.reference_field(), &reference)
                && child_record.get(field).is_none_or(Value::is_null)
            {
                child_record.insert(field.to_string(), reference.clone());
            }
            extract(*child, child_record, out);
        }
    }
    out.push(kind, record);
}

/// Reference a child uses to point at this parent document
fn parent_reference(kind: EntityKind, record: &EntityRecord) -> Option<Value> {
    if kind == EntityKind::Consumer
        && let Some(username) = record.get("username").and_then(Value::as_str)
    {
        return Some(json!({ "username": username }));
    }
    if let Some(name) = record.get("name").and_then(Value::as_str) {
        return Some(json!({ "name": name }));
    }
    record_id(record).map(|id| json!({ "id": id }))
}

fn referenced_kinds(config: &DeclarativeConfig) -> BTreeSet<EntityKind> {
    config
        .kinds()
        .flat_map(|kind| config.entities(kind))
        .flat_map(|record| record.keys())
        .filter_map(|field| EntityKind::from_reference_field(field))
        .collect()
}

/// Name-based reference for every entity id a document may point at
#[derive(Debug, Default)]
struct ReferenceIndex {
    by_id: BTreeMap<(EntityKind, String), Value>,
}

impl ReferenceIndex {
    fn from_config(config: &DeclarativeConfig) -> Self {
        let mut index = Self::default();
        for kind in config.kinds() {
            index.add_all(kind, config.entities(kind));
        }
        index
    }

    fn add_all(&mut self, kind: EntityKind, records: &[EntityRecord]) {
        if kind.reference_field().is_none() {
            return;
        }
        for record in records {
            let Some(id) = record_id(record) else {
                continue;
            };
            let reference = match kind {
                EntityKind::Consumer => record
                    .get("username")
                    .and_then(Value::as_str)
                    .map(|username| json!({ "username": username })),
                _ => record
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|name| json!({ "name": name })),
            };
            if let Some(reference) = reference {
                self.by_id.insert((kind, id.to_string()), reference);
            }
        }
    }

    /// Rewrite `{"id": ...}` and bare-id references to name references
    fn resolve(&self, kind: EntityKind, value: &Value) -> Option<Value> {
        let id = match value {
            Value::Object(map) if !map.contains_key("name") && !map.contains_key("username") => {
                map.get("id")?.as_str()?
            }
            Value::String(s) => s.as_str(),
            _ => return None,
        };
        self.by_id.get(&(kind, id.to_string())).cloned()
    }
}

/// Object form of a bare-string reference the index could not resolve
///
/// Uuids stay ids; anything else is the referenced entity's name, or its
/// username for consumers.
fn reference_object(kind: EntityKind, value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    if Uuid::parse_str(s).is_ok() {
        json!({ "id": s })
    } else if kind == EntityKind::Consumer {
        json!({ "username": s })
    } else {
        json!({ "name": s })
    }
}

fn clean(config: &DeclarativeConfig, index: &ReferenceIndex) -> DeclarativeConfig {
    let mut out = DeclarativeConfig::new();
    for kind in config.kinds() {
        let mut seen = BTreeSet::new();
        for record in config.entities(kind) {
            let record = clean_record(kind, record, index);
            let key = entity_key(&record, Some(kind));
            if seen.insert(key.clone()) {
                out.push(kind, record);
            } else {
                tracing::debug!("Dropping duplicate {} '{}'", kind, key);
            }
        }
    }
    out
}

fn clean_record(kind: EntityKind, record: &EntityRecord, index: &ReferenceIndex) -> EntityRecord {
    let mut cleaned = Map::new();
    for (field, value) in record {
        if value.is_null() || SERVER_TIMESTAMPS.contains(&field.as_str()) {
            continue;
        }
        let value = match EntityKind::from_reference_field(field) {
            Some(referenced) => index
                .resolve(referenced, value)
                .unwrap_or_else(|| reference_object(referenced, value)),
            None => value.clone(),
        };
        cleaned.insert(field.clone(), value);
    }

    for sub in kind.info().nested {
        if let Some(Value::Array(items)) = cleaned.remove(sub.field()) {
            let records = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect::<Vec<_>>();
            if !records.is_empty() {
                cleaned.insert(
                    sub.field().to_string(),
                    Value::Array(canonical_nested(*sub, records)),
                );
            }
        }
    }
    cleaned
}

//! In-memory entity store
//!
//! Behaves like a small gateway: it assigns ids and timestamps, enforces
//! references and uniqueness, refuses deletes of referenced entities and,
//! in DB-less mode, only accepts whole-config replacement. Used by tests and
//! for offline planning against an exported snapshot.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::kind::{EntityKind, SubResource};
use crate::record::{EntityRecord, record_id, record_label, reference_label};
use crate::store::{EntityStore, Scope};

#[derive(Debug, Clone)]
struct InjectedFailure {
    target: FailureTarget,
    id_or_name: String,
    status: u16,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FailureTarget {
    Entity(EntityKind),
    Nested(SubResource),
}

type NestedKey = (EntityKind, String, SubResource);

/// An entity store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    label: String,
    entities: BTreeMap<EntityKind, Vec<EntityRecord>>,
    nested: BTreeMap<NestedKey, Vec<EntityRecord>>,
    dbless: bool,
    mutations: usize,
    failures: Vec<InjectedFailure>,
    last_config: Option<Value>,
}

impl MemoryStore {
    /// Create an empty store that accepts per-entity writes
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Create an empty store that only accepts bulk config replacement
    pub fn dbless(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            dbless: true,
            ..Self::default()
        }
    }

    /// Builder form of [`MemoryStore::seed`]
    pub fn with(mut self, kind: EntityKind, document: Value) -> Self {
        self.seed(kind, document);
        self
    }

    /// Insert a document directly, bypassing checks and the mutation counter
    ///
    /// Missing ids and timestamps are filled in like a real store would.
    pub fn seed(&mut self, kind: EntityKind, document: Value) -> Option<EntityRecord> {
        let Value::Object(record) = document else {
            tracing::warn!("Ignoring non-object seed document for {}", kind);
            return None;
        };
        let record = stamp(record);
        self.entities.entry(kind).or_default().push(record.clone());
        Some(record)
    }

    /// Insert a nested record under an existing parent, bypassing the mutation counter
    pub fn seed_nested(&mut self, parent_id_or_name: &str, sub: SubResource, document: Value) {
        let Value::Object(record) = document else {
            return;
        };
        let Some(parent_id) = self
            .find(sub.parent(), parent_id_or_name)
            .and_then(|p| record_id(p).map(str::to_string))
        else {
            tracing::warn!("Cannot seed {} under missing parent {}", sub, parent_id_or_name);
            return;
        };
        let mut record = stamp(record);
        record.insert(sub.parent_field().to_string(), json!({ "id": parent_id }));
        self.nested
            .entry((sub.parent(), parent_id, sub))
            .or_default()
            .push(record);
    }

    /// Make every write touching this entity fail with the given status
    pub fn fail_on(
        &mut self,
        kind: EntityKind,
        id_or_name: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) {
        self.failures.push(InjectedFailure {
            target: FailureTarget::Entity(kind),
            id_or_name: id_or_name.into(),
            status,
            message: message.into(),
        });
    }

    /// Make nested submissions with this natural key fail
    pub fn fail_nested_on(
        &mut self,
        sub: SubResource,
        natural_key: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) {
        self.failures.push(InjectedFailure {
            target: FailureTarget::Nested(sub),
            id_or_name: natural_key.into(),
            status,
            message: message.into(),
        });
    }

    /// Number of successful mutating calls made through the store contract
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    /// All records of a kind, in insertion order
    pub fn records(&self, kind: EntityKind) -> &[EntityRecord] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look a record up by id, username or name
    pub fn find(&self, kind: EntityKind, id_or_name: &str) -> Option<&EntityRecord> {
        self.records(kind)
            .iter()
            .find(|record| matches_id_or_name(record, id_or_name))
    }

    /// Records of a nested collection, empty when the parent is unknown
    pub fn nested_records(
        &self,
        parent: EntityKind,
        parent_id_or_name: &str,
        sub: SubResource,
    ) -> Vec<EntityRecord> {
        self.list_nested(parent, parent_id_or_name, sub)
            .unwrap_or_default()
    }

    /// The last document accepted by [`EntityStore::replace_config`]
    pub fn last_config(&self) -> Option<&Value> {
        self.last_config.as_ref()
    }

    fn position(&self, kind: EntityKind, id_or_name: &str) -> Option<usize> {
        self.records(kind)
            .iter()
            .position(|record| matches_id_or_name(record, id_or_name))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.dbless {
            return Err(Error::api(
                405,
                "cannot write entities while the gateway runs without a database",
            ));
        }
        Ok(())
    }

    fn check_failure(&self, target: FailureTarget, names: &[Option<&str>]) -> Result<()> {
        for failure in &self.failures {
            if failure.target == target
                && names.iter().flatten().any(|n| *n == failure.id_or_name)
            {
                return Err(Error::api(failure.status, failure.message.clone()));
            }
        }
        Ok(())
    }

    fn check_references(&self, body: &EntityRecord) -> Result<()> {
        for (field, value) in body {
            let Some(referenced) = EntityKind::from_reference_field(field) else {
                continue;
            };
            let Some(label) = reference_label(value) else {
                continue;
            };
            if self.find(referenced, &label).is_none() {
                return Err(Error::api(
                    400,
                    format!(
                        "schema violation ({}: no {} '{}')",
                        field,
                        referenced.singular(),
                        label
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_unique(
        &self,
        kind: EntityKind,
        body: &EntityRecord,
        except: Option<usize>,
    ) -> Result<()> {
        for (index, other) in self.records(kind).iter().enumerate() {
            if Some(index) == except {
                continue;
            }
            let same_id = record_id(body).is_some() && record_id(body) == record_id(other);
            let same_identity = if kind.is_scoped() {
                body.get("name") == other.get("name")
                    && self.scope_labels(body) == self.scope_labels(other)
            } else {
                record_label(body).is_some() && record_label(body) == record_label(other)
            };
            if same_id || same_identity {
                return Err(Error::api(
                    409,
                    format!(
                        "UNIQUE violation detected on {} '{}'",
                        kind.singular(),
                        record_label(body).or(record_id(body)).unwrap_or("?")
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Parent references of a scoped record, resolved to ids where possible
    fn scope_labels(&self, record: &EntityRecord) -> Vec<Option<String>> {
        ["service", "route", "consumer", "consumer_group"]
            .iter()
            .map(|field| {
                let value = record.get(*field)?;
                let label = reference_label(value)?;
                let kind = EntityKind::from_reference_field(field)?;
                Some(
                    self.find(kind, &label)
                        .and_then(record_id)
                        .map(str::to_string)
                        .unwrap_or(label),
                )
            })
            .collect()
    }

    fn is_referenced(&self, kind: EntityKind, record: &EntityRecord) -> Option<EntityKind> {
        let field = kind.reference_field()?;
        let id = record_id(record);
        let label = record_label(record);
        for (other_kind, records) in &self.entities {
            for other in records {
                let Some(value) = other.get(field) else {
                    continue;
                };
                let referenced = reference_label(value);
                if referenced.is_some()
                    && (referenced.as_deref() == id || referenced.as_deref() == label)
                {
                    return Some(*other_kind);
                }
            }
        }
        None
    }

    fn parent_id(&self, parent: EntityKind, parent_id_or_name: &str) -> Result<String> {
        self.find(parent, parent_id_or_name)
            .and_then(record_id)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::api(
                    404,
                    format!("{} '{}' not found", parent.singular(), parent_id_or_name),
                )
            })
    }
}

impl EntityStore for MemoryStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn list(&self, kind: EntityKind, scope: Option<&Scope>) -> Result<Vec<EntityRecord>> {
        let Some(scope) = scope else {
            return Ok(self.records(kind).to_vec());
        };
        let Some(field) = scope.parent.reference_field() else {
            return Ok(Vec::new());
        };
        let Some(parent) = self.find(scope.parent, &scope.id_or_name) else {
            return Err(Error::api(
                404,
                format!("{} '{}' not found", scope.parent.singular(), scope.id_or_name),
            ));
        };
        let parent_names = [record_id(parent), record_label(parent)];
        Ok(self
            .records(kind)
            .iter()
            .filter(|record| {
                let referenced = record.get(field).and_then(reference_label);
                referenced.is_some() && parent_names.contains(&referenced.as_deref())
            })
            .cloned()
            .collect())
    }

    fn get(&self, kind: EntityKind, id_or_name: &str) -> Result<Option<EntityRecord>> {
        Ok(self.find(kind, id_or_name).cloned())
    }

    fn create(&mut self, kind: EntityKind, body: &EntityRecord) -> Result<EntityRecord> {
        self.ensure_writable()?;
        self.check_failure(
            FailureTarget::Entity(kind),
            &[record_label(body), record_id(body)],
        )?;
        self.check_references(body)?;
        self.check_unique(kind, body, None)?;

        let record = stamp(body.clone());
        self.entities.entry(kind).or_default().push(record.clone());
        self.mutations += 1;
        Ok(record)
    }

    fn update(
        &mut self,
        kind: EntityKind,
        id_or_name: &str,
        body: &EntityRecord,
    ) -> Result<EntityRecord> {
        self.ensure_writable()?;
        let index = self.position(kind, id_or_name).ok_or_else(|| {
            Error::api(404, format!("{} '{}' not found", kind.singular(), id_or_name))
        })?;
        self.check_failure(
            FailureTarget::Entity(kind),
            &[Some(id_or_name), record_label(body)],
        )?;
        self.check_references(body)?;

        let existing = &self.records(kind)[index];
        let mut record = body.clone();
        for field in ["id", "created_at"] {
            if let Some(value) = existing.get(field) {
                record.insert(field.to_string(), value.clone());
            }
        }
        record.insert("updated_at".to_string(), now());
        self.check_unique(kind, &record, Some(index))?;

        self.entities.entry(kind).or_default()[index] = record.clone();
        self.mutations += 1;
        Ok(record)
    }

    fn patch(
        &mut self,
        kind: EntityKind,
        id_or_name: &str,
        body: &EntityRecord,
    ) -> Result<EntityRecord> {
        let mut merged = self
            .find(kind, id_or_name)
            .cloned()
            .ok_or_else(|| {
                Error::api(404, format!("{} '{}' not found", kind.singular(), id_or_name))
            })?;
        for (field, value) in body {
            merged.insert(field.clone(), value.clone());
        }
        self.update(kind, id_or_name, &merged)
    }

    fn delete(&mut self, kind: EntityKind, id_or_name: &str) -> Result<()> {
        self.ensure_writable()?;
        let index = self.position(kind, id_or_name).ok_or_else(|| {
            Error::api(404, format!("{} '{}' not found", kind.singular(), id_or_name))
        })?;
        self.check_failure(FailureTarget::Entity(kind), &[Some(id_or_name)])?;

        let record = &self.records(kind)[index];
        if let Some(dependent) = self.is_referenced(kind, record) {
            return Err(Error::api(
                400,
                format!(
                    "an existing '{}' entity references this '{}' entity",
                    dependent, kind
                ),
            ));
        }

        let removed = self.entities.entry(kind).or_default().remove(index);
        if let Some(id) = record_id(&removed) {
            self.nested.retain(|(parent, parent_id, _), _| {
                !(*parent == kind && parent_id.as_str() == id)
            });
        }
        self.mutations += 1;
        Ok(())
    }

    fn list_nested(
        &self,
        parent: EntityKind,
        parent_id: &str,
        sub: SubResource,
    ) -> Result<Vec<EntityRecord>> {
        let parent_id = self.parent_id(parent, parent_id)?;
        Ok(self
            .nested
            .get(&(parent, parent_id, sub))
            .cloned()
            .unwrap_or_default())
    }

    fn create_nested(
        &mut self,
        parent: EntityKind,
        parent_id: &str,
        sub: SubResource,
        body: &EntityRecord,
    ) -> Result<EntityRecord> {
        self.ensure_writable()?;
        let parent_id = self.parent_id(parent, parent_id)?;
        let natural = body.get(sub.natural_key()).and_then(Value::as_str);
        self.check_failure(FailureTarget::Nested(sub), &[natural])?;

        let mut record = stamp(body.clone());
        record.insert(sub.parent_field().to_string(), json!({ "id": parent_id }));

        let collection = self.nested.entry((parent, parent_id, sub)).or_default();
        match collection
            .iter()
            .position(|existing| existing.get(sub.natural_key()) == body.get(sub.natural_key()))
        {
            Some(index) if natural.is_some() => {
                if let Some(id) = collection[index].get("id") {
                    record.insert("id".to_string(), id.clone());
                }
                collection[index] = record.clone();
            }
            _ => collection.push(record.clone()),
        }
        self.mutations += 1;
        Ok(record)
    }

    fn supports_incremental_apply(&self) -> Result<bool> {
        Ok(!self.dbless)
    }

    fn replace_config(&mut self, document: &Value) -> Result<()> {
        if !self.dbless {
            return Err(Error::Unsupported {
                store: self.label.clone(),
                operation: "bulk config replacement".to_string(),
            });
        }
        let root = document
            .as_object()
            .ok_or_else(|| Error::InvalidResponse("config document must be an object".into()))?;

        self.entities.clear();
        self.nested.clear();
        for kind in EntityKind::ALL {
            let Some(items) = root.get(kind.plural()).and_then(Value::as_array) else {
                continue;
            };
            for item in items {
                let Value::Object(record) = item else {
                    continue;
                };
                let mut record = stamp(record.clone());
                let parent_id = record_id(&record).unwrap_or_default().to_string();
                for sub in kind.info().nested {
                    let Some(Value::Array(children)) = record.remove(sub.field()) else {
                        continue;
                    };
                    let collection = self
                        .nested
                        .entry((kind, parent_id.clone(), *sub))
                        .or_default();
                    for child in children {
                        if let Value::Object(child) = child {
                            let mut child = stamp(child);
                            child.insert(
                                sub.parent_field().to_string(),
                                json!({ "id": parent_id }),
                            );
                            collection.push(child);
                        }
                    }
                }
                self.entities.entry(kind).or_default().push(record);
            }
        }
        self.last_config = Some(document.clone());
        self.mutations += 1;
        Ok(())
    }
}

fn now() -> Value {
    json!(Utc::now().timestamp())
}

/// Fill in the fields a store assigns on insert
fn stamp(mut record: EntityRecord) -> EntityRecord {
    if record_id(&record).is_none() {
        record.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }
    let ts = now();
    record.entry("created_at").or_insert_with(|| ts.clone());
    record.entry("updated_at").or_insert(ts);
    record
}

fn matches_id_or_name(record: &EntityRecord, id_or_name: &str) -> bool {
    record_id(record) == Some(id_or_name) || record_label(record) == Some(id_or_name)
}

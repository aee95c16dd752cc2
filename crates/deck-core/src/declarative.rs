//! Declarative configuration documents
//!
//! A [`DeclarativeConfig`] is the full state of one store as typed entity
//! lists. It reads and writes the Kong declarative layout:
//!
//! ```yaml
//! _format_version: "3.0"
//! services:
//!   - name: api
//!     host: a.local
//!     routes:
//!       - name: r1
//!         paths: ["/"]
//! ```
//!
//! Documents read from disk may still contain nested children; see
//! [`crate::export::flatten`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use deck_store::{EntityKind, EntityRecord};
use serde_json::{Map, Value};

use crate::diff::{ConfigDiff, Operation, entity_key};
use crate::error::{Error, Result};

/// Format marker written into every document
pub const FORMAT_VERSION: &str = "3.0";

/// Root key carrying the format marker
pub const FORMAT_VERSION_KEY: &str = "_format_version";

/// Full state document composed of typed entity lists
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarativeConfig {
    format_version: String,
    entities: BTreeMap<EntityKind, Vec<EntityRecord>>,
}

impl Default for DeclarativeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DeclarativeConfig {
    /// Create an empty config at the current format version
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            entities: BTreeMap::new(),
        }
    }

    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = version.into();
        self
    }

    /// Entities of one kind, in document order
    pub fn entities(&self, kind: EntityKind) -> &[EntityRecord] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entities_mut(&mut self, kind: EntityKind) -> &mut Vec<EntityRecord> {
        self.entities.entry(kind).or_default()
    }

    /// Replace the list for one kind
    pub fn set(&mut self, kind: EntityKind, records: Vec<EntityRecord>) {
        self.entities.insert(kind, records);
    }

    pub fn push(&mut self, kind: EntityKind, record: EntityRecord) {
        self.entities_mut(kind).push(record);
    }

    /// Kinds with at least one entity, in dependency-rank order
    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.entities
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(kind, _)| *kind)
    }

    /// Total number of top-level entities
    pub fn len(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy holding only the given kinds
    pub fn restrict(&self, kinds: &[EntityKind]) -> Self {
        Self {
            format_version: self.format_version.clone(),
            entities: self
                .entities
                .iter()
                .filter(|(kind, _)| kinds.contains(kind))
                .map(|(kind, records)| (*kind, records.clone()))
                .collect(),
        }
    }

    /// Parse a JSON value in the declarative layout
    ///
    /// Root keys starting with `_` other than the format marker are metadata
    /// and ignored. Any other unknown root key is an error.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(root) = value else {
            return Err(Error::InvalidConfig {
                message: "document root must be a mapping".to_string(),
            });
        };

        let mut config = Self::new();
        for (key, value) in root {
            if key == FORMAT_VERSION_KEY {
                config.format_version = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                continue;
            }
            if key.starts_with('_') {
                tracing::debug!("Ignoring metadata key {}", key);
                continue;
            }
            let kind: EntityKind = key.parse().map_err(|_| Error::InvalidConfig {
                message: format!("unknown entity type '{}'", key),
            })?;
            let Value::Array(items) = value else {
                return Err(Error::InvalidConfig {
                    message: format!("'{}' must be a list", key),
                });
            };
            for item in items {
                let Value::Object(record) = item else {
                    return Err(Error::InvalidConfig {
                        message: format!("every entry of '{}' must be a mapping", key),
                    });
                };
                config.push(kind, record);
            }
        }
        Ok(config)
    }

    /// Render the declarative layout, format marker first
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            FORMAT_VERSION_KEY.to_string(),
            Value::String(self.format_version.clone()),
        );
        for kind in self.kinds() {
            root.insert(
                kind.plural().to_string(),
                Value::Array(
                    self.entities(kind)
                        .iter()
                        .cloned()
                        .map(Value::Object)
                        .collect(),
                ),
            );
        }
        Value::Object(root)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    /// Load a state file; `.json` files are parsed as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Write a state file in the format implied by its extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.to_json_string()?,
            _ => self.to_yaml_string()?,
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Fold a plan into this snapshot, producing the state it would lead to
    ///
    /// Used to build the full document for stores that only accept bulk
    /// replacement.
    pub fn apply_diffs(&mut self, diffs: &[ConfigDiff]) {
        for diff in diffs {
            let kind = diff.entity_kind;
            let records = self.entities_mut(kind);
            let position = records
                .iter()
                .position(|record| entity_key(record, Some(kind)) == diff.key);
            match (diff.operation, position, &diff.desired) {
                (Operation::Create, None, Some(desired)) => records.push(desired.clone()),
                (Operation::Create | Operation::Update, Some(index), Some(desired)) => {
                    let mut merged = desired.clone();
                    if let Some(id) = records[index].get("id") {
                        merged.entry("id").or_insert_with(|| id.clone());
                    }
                    records[index] = merged;
                }
                (Operation::Delete, Some(index), _) => {
                    records.remove(index);
                }
                _ => {
                    tracing::debug!("Nothing to fold for {} {}", diff.operation, diff.key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_yaml_with_metadata() {
        let config = DeclarativeConfig::from_yaml_str(
            r#"
_format_version: "3.0"
_info:
  select_tags: [prod]
services:
  - name: api
    host: a.local
consumers:
  - username: alice
"#,
        )
        .unwrap();

        assert_eq!(config.format_version(), "3.0");
        assert_eq!(config.entities(EntityKind::Service).len(), 1);
        assert_eq!(config.entities(EntityKind::Consumer).len(), 1);
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn rejects_unknown_entity_type() {
        let err = DeclarativeConfig::from_value(json!({"widgets": []})).unwrap_err();
        assert!(err.to_string().contains("widgets"));
    }

    #[test]
    fn rejects_non_list_section() {
        let err = DeclarativeConfig::from_value(json!({"services": {"name": "api"}})).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn to_value_orders_by_rank_and_skips_empty() {
        let mut config = DeclarativeConfig::new();
        config.push(
            EntityKind::Route,
            json!({"name": "r1"}).as_object().cloned().unwrap(),
        );
        config.push(
            EntityKind::Service,
            json!({"name": "api"}).as_object().cloned().unwrap(),
        );
        config.set(EntityKind::Plugin, Vec::new());

        let kinds: Vec<EntityKind> = config.kinds().collect();
        assert_eq!(kinds, vec![EntityKind::Service, EntityKind::Route]);

        let value = config.to_value();
        assert_eq!(value[FORMAT_VERSION_KEY], json!("3.0"));
        assert!(value.get("plugins").is_none());
    }

    #[test]
    fn save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let config = DeclarativeConfig::from_value(json!({
            "services": [{"name": "api", "host": "a.local"}]
        }))
        .unwrap();

        config.save(&path).unwrap();
        let loaded = DeclarativeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}

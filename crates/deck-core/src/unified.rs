//! Unified view over both stores
//!
//! Pairs Gateway and control-plane entities of the same kind by identity key
//! and classifies each pair as present on one side, synced, or drifted.

use std::collections::{BTreeMap, BTreeSet};

use deck_store::{EntityKind, EntityRecord, StoreRole, record_id};
use serde::{Deserialize, Serialize};

use crate::declarative::DeclarativeConfig;
use crate::diff::{Changes, diff_entity, key_map};

/// Where an entity exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Gateway,
    ControlPlane,
    Both,
}

impl Source {
    /// Whether the entity exists on the store playing `role`
    pub fn includes(self, role: StoreRole) -> bool {
        matches!(
            (self, role),
            (Self::Both, _)
                | (Self::Gateway, StoreRole::Gateway)
                | (Self::ControlPlane, StoreRole::ControlPlane)
        )
    }
}

/// One identity key as seen from both stores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedEntity {
    pub kind: EntityKind,
    pub key: String,
    /// Gateway snapshot when present, else the control-plane one
    pub entity: EntityRecord,
    pub source: Source,
    pub gateway_id: Option<String>,
    pub control_plane_id: Option<String>,
    pub has_drift: bool,
    pub drift_fields: Vec<String>,
    /// Field detail of the drift, gateway value as `old`
    pub drift: Changes,
    pub gateway_entity: Option<EntityRecord>,
    pub control_plane_entity: Option<EntityRecord>,
}

impl UnifiedEntity {
    /// Snapshot held by the store playing `role`
    pub fn side(&self, role: StoreRole) -> Option<&EntityRecord> {
        match role {
            StoreRole::Gateway => self.gateway_entity.as_ref(),
            StoreRole::ControlPlane => self.control_plane_entity.as_ref(),
        }
    }
}

/// Per-kind counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    pub gateway_only: usize,
    pub control_plane_only: usize,
    /// Present on both sides without drift
    pub synced: usize,
    pub drift: usize,
    pub total: usize,
}

impl KindSummary {
    fn count(&mut self, entity: &UnifiedEntity) {
        match (entity.source, entity.has_drift) {
            (Source::Gateway, _) => self.gateway_only += 1,
            (Source::ControlPlane, _) => self.control_plane_only += 1,
            (Source::Both, false) => self.synced += 1,
            (Source::Both, true) => self.drift += 1,
        }
        self.total += 1;
    }

    fn add(&mut self, other: &KindSummary) {
        self.gateway_only += other.gateway_only;
        self.control_plane_only += other.control_plane_only;
        self.synced += other.synced;
        self.drift += other.drift;
        self.total += other.total;
    }
}

/// Flat list of unified entities plus per-kind counts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnifiedView {
    pub entities: Vec<UnifiedEntity>,
    pub summary: BTreeMap<EntityKind, KindSummary>,
}

impl UnifiedView {
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &UnifiedEntity> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }

    pub fn drifted(&self) -> impl Iterator<Item = &UnifiedEntity> {
        self.entities.iter().filter(|e| e.has_drift)
    }

    /// Counts summed over every kind
    pub fn totals(&self) -> KindSummary {
        let mut totals = KindSummary::default();
        for summary in self.summary.values() {
            totals.add(summary);
        }
        totals
    }

    /// Whether both stores hold the same entities with no drift
    pub fn in_sync(&self) -> bool {
        let totals = self.totals();
        totals.synced == totals.total
    }
}

/// Pair the two snapshots by identity key
pub fn resolve(gateway: &DeclarativeConfig, control_plane: &DeclarativeConfig) -> UnifiedView {
    let kinds: BTreeSet<EntityKind> = gateway.kinds().chain(control_plane.kinds()).collect();
    let mut view = UnifiedView::default();

    for kind in kinds {
        let gw = key_map(kind, gateway.entities(kind));
        let cp = key_map(kind, control_plane.entities(kind));
        let keys: BTreeSet<&String> = gw.keys().chain(cp.keys()).collect();
        let mut summary = KindSummary::default();

        for key in keys {
            let entity = unify(kind, key, gw.get(key).copied(), cp.get(key).copied());
            summary.count(&entity);
            view.entities.push(entity);
        }
        tracing::debug!(
            "{}: {} synced, {} drifted, {} gateway-only, {} control-plane-only",
            kind,
            summary.synced,
            summary.drift,
            summary.gateway_only,
            summary.control_plane_only
        );
        view.summary.insert(kind, summary);
    }
    view
}

fn unify(
    kind: EntityKind,
    key: &str,
    gateway: Option<&EntityRecord>,
    control_plane: Option<&EntityRecord>,
) -> UnifiedEntity {
    let id_of = |record: &EntityRecord| record_id(record).unwrap_or(key).to_string();
    let drift = match (gateway, control_plane) {
        (Some(gw), Some(cp)) => diff_entity(gw, cp).unwrap_or_default(),
        _ => Changes::new(),
    };
    let source = match (gateway, control_plane) {
        (Some(_), Some(_)) => Source::Both,
        (Some(_), None) => Source::Gateway,
        _ => Source::ControlPlane,
    };
    let entity = gateway.or(control_plane).cloned().unwrap_or_default();

    UnifiedEntity {
        kind,
        key: key.to_string(),
        entity,
        source,
        gateway_id: gateway.map(id_of),
        control_plane_id: control_plane.map(id_of),
        has_drift: !drift.is_empty(),
        drift_fields: drift.keys().cloned().collect(),
        drift,
        gateway_entity: gateway.cloned(),
        control_plane_entity: control_plane.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config(value: serde_json::Value) -> DeclarativeConfig {
        DeclarativeConfig::from_value(value).unwrap()
    }

    #[test]
    fn classifies_every_pair() {
        let gateway = config(json!({
            "services": [
                {"id": "g1", "name": "same", "host": "h"},
                {"id": "g2", "name": "changed", "host": "a"},
                {"id": "g3", "name": "local", "host": "h"}
            ]
        }));
        let control_plane = config(json!({
            "services": [
                {"id": "c1", "name": "same", "host": "h"},
                {"id": "c2", "name": "changed", "host": "b"},
                {"id": "c4", "name": "remote", "host": "h"}
            ]
        }));

        let view = resolve(&gateway, &control_plane);

        assert_eq!(
            view.summary[&EntityKind::Service],
            KindSummary {
                gateway_only: 1,
                control_plane_only: 1,
                synced: 1,
                drift: 1,
                total: 4
            }
        );
        let changed = view.drifted().next().unwrap();
        assert_eq!(changed.key, "changed");
        assert_eq!(changed.drift_fields, vec!["host".to_string()]);
        assert_eq!(changed.gateway_id.as_deref(), Some("g2"));
        assert_eq!(changed.control_plane_id.as_deref(), Some("c2"));
        assert!(!view.in_sync());
    }

    #[test]
    fn both_source_without_ids_uses_key() {
        let gateway = config(json!({"consumers": [{"username": "alice"}]}));
        let view = resolve(&gateway, &gateway);

        let alice = &view.entities[0];
        assert_eq!(alice.source, Source::Both);
        assert_eq!(alice.gateway_id.as_deref(), Some("alice"));
        assert_eq!(alice.control_plane_id.as_deref(), Some("alice"));
        assert!(view.in_sync());
    }

    #[test]
    fn source_includes_role() {
        assert!(Source::Both.includes(StoreRole::Gateway));
        assert!(Source::ControlPlane.includes(StoreRole::ControlPlane));
        assert!(!Source::Gateway.includes(StoreRole::ControlPlane));
    }
}

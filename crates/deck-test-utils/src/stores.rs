//! Seeded [`MemoryStore`] pairs for sync scenarios.
//!
//! Each store stamps its own ids, so the same entity carries different ids on
//! the two sides, as it does between a real Gateway and its control plane.

use deck_store::{EntityKind, MemoryStore, record_id};
use serde_json::{Value, json};

use crate::entities;

pub const GATEWAY: &str = "gateway";
pub const CONTROL_PLANE: &str = "control plane";

/// Seed a document and return the id the store gave it
pub fn seed(store: &mut MemoryStore, kind: EntityKind, document: Value) -> String {
    let record = store
        .seed(kind, document)
        .expect("seed document must be a JSON object");
    record_id(&record)
        .expect("seeded record has an id")
        .to_string()
}

/// Service `api`, its route `api-route` (by id reference) and a rate-limiting
/// plugin scoped to the service
pub fn seed_api(store: &mut MemoryStore, host: &str) {
    let service_id = seed(store, EntityKind::Service, entities::service("api", host));
    seed(
        store,
        EntityKind::Route,
        entities::route("api-route", entities::id_ref(&service_id), &["/api"]),
    );
    seed(
        store,
        EntityKind::Plugin,
        entities::scoped_plugin(
            "rate-limiting",
            "service",
            entities::id_ref(&service_id),
            json!({ "minute": 10 }),
        ),
    );
}

/// A Gateway holding the `api` topology and nothing on the control plane
pub fn gateway_only() -> (MemoryStore, MemoryStore) {
    let mut gateway = MemoryStore::new(GATEWAY);
    seed_api(&mut gateway, "g.local");
    (gateway, MemoryStore::new(CONTROL_PLANE))
}

/// Both sides hold the same `api` topology
pub fn in_sync() -> (MemoryStore, MemoryStore) {
    let mut gateway = MemoryStore::new(GATEWAY);
    let mut control_plane = MemoryStore::new(CONTROL_PLANE);
    seed_api(&mut gateway, "g.local");
    seed_api(&mut control_plane, "g.local");
    (gateway, control_plane)
}

/// Service `api` with host `g.local` on the Gateway and `k.local` on the
/// control plane
pub fn drifted_service() -> (MemoryStore, MemoryStore) {
    let gateway = MemoryStore::new(GATEWAY)
        .with(EntityKind::Service, entities::service("api", "g.local"));
    let control_plane = MemoryStore::new(CONTROL_PLANE)
        .with(EntityKind::Service, entities::service("api", "k.local"));
    (gateway, control_plane)
}

/// The `api` topology drifted on the service host, a new Gateway-only service
/// `billing`, and a control-plane-only service `legacy`
pub fn mixed() -> (MemoryStore, MemoryStore) {
    let mut gateway = MemoryStore::new(GATEWAY);
    let mut control_plane = MemoryStore::new(CONTROL_PLANE);
    seed_api(&mut gateway, "g.local");
    seed_api(&mut control_plane, "k.local");
    seed(
        &mut gateway,
        EntityKind::Service,
        entities::service("billing", "billing.local"),
    );
    seed(
        &mut control_plane,
        EntityKind::Service,
        entities::service("legacy", "legacy.local"),
    );
    (gateway, control_plane)
}

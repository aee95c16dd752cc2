//! JSON documents for the common entity kinds.
//!
//! Documents carry no ids; stores stamp them on seed or create.

use serde_json::{Value, json};

pub fn service(name: &str, host: &str) -> Value {
    json!({
        "name": name,
        "host": host,
        "port": 80,
        "protocol": "http",
    })
}

/// A route attached to `service` by reference
pub fn route(name: &str, service: Value, paths: &[&str]) -> Value {
    json!({
        "name": name,
        "paths": paths,
        "service": service,
    })
}

/// A plugin with no scope
pub fn global_plugin(name: &str, config: Value) -> Value {
    json!({
        "name": name,
        "enabled": true,
        "config": config,
    })
}

/// A plugin scoped to one parent through `field` (`service`, `route`, ...)
pub fn scoped_plugin(name: &str, field: &str, parent: Value, config: Value) -> Value {
    let mut plugin = global_plugin(name, config);
    plugin[field] = parent;
    plugin
}

pub fn consumer(username: &str) -> Value {
    json!({ "username": username })
}

pub fn upstream(name: &str) -> Value {
    json!({
        "name": name,
        "algorithm": "round-robin",
    })
}

pub fn target(target: &str, weight: u64) -> Value {
    json!({ "target": target, "weight": weight })
}

/// `{"id": id}` reference
pub fn id_ref(id: &str) -> Value {
    json!({ "id": id })
}

/// `{"name": name}` reference
pub fn name_ref(name: &str) -> Value {
    json!({ "name": name })
}

//! Local shape checks run before any write reaches a store

use std::sync::LazyLock;

use deck_store::{EntityKind, EntityRecord};
use regex::Regex;
use serde_json::Value;

use crate::diff::entity_key;
use crate::error::{Error, Result};

/// Names the gateway accepts for services, routes and upstreams
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("Invalid name regex"));

/// Route fields that make a route matchable
const ROUTE_MATCHERS: [&str; 7] = [
    "paths",
    "hosts",
    "methods",
    "headers",
    "snis",
    "sources",
    "destinations",
];

/// Check that a desired document carries the fields its kind requires
pub fn validate_entity(kind: EntityKind, entity: &EntityRecord) -> Result<()> {
    let fail = |message: String| Error::Validation {
        kind: kind.singular().to_string(),
        key: entity_key(entity, Some(kind)),
        message,
    };

    match kind {
        EntityKind::Service => {
            if !has_text(entity, "host") && !has_text(entity, "url") {
                return Err(fail("a service needs `host` or `url`".into()));
            }
        }
        EntityKind::Route => {
            if !ROUTE_MATCHERS.iter().any(|field| has_items(entity, field)) {
                return Err(fail(format!(
                    "a route needs at least one of {}",
                    ROUTE_MATCHERS.join(", ")
                )));
            }
        }
        EntityKind::Upstream | EntityKind::Plugin | EntityKind::ConsumerGroup | EntityKind::Sni => {
            if !has_text(entity, "name") {
                return Err(fail(format!("a {} needs `name`", kind.singular())));
            }
        }
        EntityKind::Consumer => {
            if !has_text(entity, "username") && !has_text(entity, "custom_id") {
                return Err(fail("a consumer needs `username` or `custom_id`".into()));
            }
        }
        EntityKind::Certificate => {
            if !has_text(entity, "cert") || !has_text(entity, "key") {
                return Err(fail("a certificate needs `cert` and `key`".into()));
            }
        }
        EntityKind::CaCertificate => {
            if !has_text(entity, "cert") {
                return Err(fail("a CA certificate needs `cert`".into()));
            }
        }
        EntityKind::Vault => {
            if !has_text(entity, "name") || !has_text(entity, "prefix") {
                return Err(fail("a vault needs `name` and `prefix`".into()));
            }
        }
        EntityKind::Key => {
            if !has_text(entity, "kid") {
                return Err(fail("a key needs `kid`".into()));
            }
        }
        EntityKind::KeySet => {}
    }

    if matches!(
        kind,
        EntityKind::Service | EntityKind::Route | EntityKind::Upstream
    ) && let Some(name) = entity.get("name").and_then(Value::as_str)
        && !NAME_PATTERN.is_match(name)
    {
        return Err(fail(format!(
            "name '{}' may only contain letters, digits and . _ ~ -",
            name
        )));
    }

    Ok(())
}

fn has_text(entity: &EntityRecord, field: &str) -> bool {
    entity
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

fn has_items(entity: &EntityRecord, field: &str) -> bool {
    match entity.get(field) {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn record(value: Value) -> EntityRecord {
        value.as_object().cloned().unwrap()
    }

    #[rstest]
    #[case(EntityKind::Service, json!({"name": "api", "host": "a.local"}))]
    #[case(EntityKind::Service, json!({"url": "http://a.local"}))]
    #[case(EntityKind::Route, json!({"name": "r1", "paths": ["/"]}))]
    #[case(EntityKind::Route, json!({"headers": {"x-env": ["prod"]}}))]
    #[case(EntityKind::Plugin, json!({"name": "cors"}))]
    #[case(EntityKind::Consumer, json!({"custom_id": "c-1"}))]
    #[case(EntityKind::Upstream, json!({"name": "backend.v1"}))]
    fn accepts_valid_entities(#[case] kind: EntityKind, #[case] entity: Value) {
        validate_entity(kind, &record(entity)).unwrap();
    }

    #[rstest]
    #[case(EntityKind::Service, json!({"name": "api"}), "host")]
    #[case(EntityKind::Route, json!({"name": "r1", "paths": []}), "at least one")]
    #[case(EntityKind::Plugin, json!({"config": {}}), "name")]
    #[case(EntityKind::Consumer, json!({"tags": []}), "username")]
    #[case(EntityKind::Service, json!({"name": "my api", "host": "h"}), "may only contain")]
    #[case(EntityKind::Certificate, json!({"cert": "PEM"}), "key")]
    fn rejects_invalid_entities(
        #[case] kind: EntityKind,
        #[case] entity: Value,
        #[case] expected: &str,
    ) {
        let err = validate_entity(kind, &record(entity)).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(
            err.to_string().contains(expected),
            "expected '{}' in: {}",
            expected,
            err
        );
    }
}

//! Entity kind registry
//!
//! Every entity the gateway exposes is one of a closed set of kinds. The
//! registry maps each kind to its plural label (the REST collection and the
//! declarative key), its dependency rank and the sub-resources nested under it.
//! Engines consult the registry instead of branching on type strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A gateway entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "vaults")]
    Vault,
    #[serde(rename = "key_sets")]
    KeySet,
    #[serde(rename = "keys")]
    Key,
    #[serde(rename = "certificates")]
    Certificate,
    #[serde(rename = "ca_certificates")]
    CaCertificate,
    #[serde(rename = "services")]
    Service,
    #[serde(rename = "upstreams")]
    Upstream,
    #[serde(rename = "consumers")]
    Consumer,
    #[serde(rename = "consumer_groups")]
    ConsumerGroup,
    #[serde(rename = "snis")]
    Sni,
    #[serde(rename = "routes")]
    Route,
    #[serde(rename = "plugins")]
    Plugin,
}

/// Static facts about one entity kind
#[derive(Debug)]
pub struct KindInfo {
    /// Collection label, e.g. `services`
    pub plural: &'static str,
    /// Singular label, e.g. `service`
    pub singular: &'static str,
    /// Lower ranks are created first and deleted last
    pub rank: u8,
    /// Kinds that may be embedded in this kind's documents before flattening
    pub children: &'static [EntityKind],
    /// Sub-resources that stay nested under this kind
    pub nested: &'static [SubResource],
}

const CONSUMER_CREDENTIALS: [SubResource; 6] = [
    SubResource::Credential(CredentialKind::KeyAuth),
    SubResource::Credential(CredentialKind::BasicAuth),
    SubResource::Credential(CredentialKind::Jwt),
    SubResource::Credential(CredentialKind::Oauth2),
    SubResource::Credential(CredentialKind::Acl),
    SubResource::Credential(CredentialKind::HmacAuth),
];

static VAULT: KindInfo = KindInfo {
    plural: "vaults",
    singular: "vault",
    rank: 0,
    children: &[],
    nested: &[],
};
static KEY_SET: KindInfo = KindInfo {
    plural: "key_sets",
    singular: "key_set",
    rank: 0,
    children: &[],
    nested: &[],
};
static KEY: KindInfo = KindInfo {
    plural: "keys",
    singular: "key",
    rank: 1,
    children: &[],
    nested: &[],
};
static CERTIFICATE: KindInfo = KindInfo {
    plural: "certificates",
    singular: "certificate",
    rank: 1,
    children: &[EntityKind::Sni],
    nested: &[],
};
static CA_CERTIFICATE: KindInfo = KindInfo {
    plural: "ca_certificates",
    singular: "ca_certificate",
    rank: 1,
    children: &[],
    nested: &[],
};
static SERVICE: KindInfo = KindInfo {
    plural: "services",
    singular: "service",
    rank: 2,
    children: &[EntityKind::Route, EntityKind::Plugin],
    nested: &[],
};
static UPSTREAM: KindInfo = KindInfo {
    plural: "upstreams",
    singular: "upstream",
    rank: 2,
    children: &[],
    nested: &[SubResource::Targets],
};
static CONSUMER: KindInfo = KindInfo {
    plural: "consumers",
    singular: "consumer",
    rank: 2,
    children: &[EntityKind::Plugin],
    nested: &CONSUMER_CREDENTIALS,
};
static CONSUMER_GROUP: KindInfo = KindInfo {
    plural: "consumer_groups",
    singular: "consumer_group",
    rank: 2,
    children: &[EntityKind::Plugin],
    nested: &[],
};
static SNI: KindInfo = KindInfo {
    plural: "snis",
    singular: "sni",
    rank: 2,
    children: &[],
    nested: &[],
};
static ROUTE: KindInfo = KindInfo {
    plural: "routes",
    singular: "route",
    rank: 3,
    children: &[EntityKind::Plugin],
    nested: &[],
};
static PLUGIN: KindInfo = KindInfo {
    plural: "plugins",
    singular: "plugin",
    rank: 4,
    children: &[],
    nested: &[],
};

impl EntityKind {
    /// Every kind, in ascending dependency rank
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Vault,
        EntityKind::KeySet,
        EntityKind::Key,
        EntityKind::Certificate,
        EntityKind::CaCertificate,
        EntityKind::Service,
        EntityKind::Upstream,
        EntityKind::Consumer,
        EntityKind::ConsumerGroup,
        EntityKind::Sni,
        EntityKind::Route,
        EntityKind::Plugin,
    ];

    /// Registry entry for this kind
    pub fn info(self) -> &'static KindInfo {
        match self {
            Self::Vault => &VAULT,
            Self::KeySet => &KEY_SET,
            Self::Key => &KEY,
            Self::Certificate => &CERTIFICATE,
            Self::CaCertificate => &CA_CERTIFICATE,
            Self::Service => &SERVICE,
            Self::Upstream => &UPSTREAM,
            Self::Consumer => &CONSUMER,
            Self::ConsumerGroup => &CONSUMER_GROUP,
            Self::Sni => &SNI,
            Self::Route => &ROUTE,
            Self::Plugin => &PLUGIN,
        }
    }

    pub fn plural(self) -> &'static str {
        self.info().plural
    }

    pub fn singular(self) -> &'static str {
        self.info().singular
    }

    pub fn rank(self) -> u8 {
        self.info().rank
    }

    /// Whether identity depends on the parent resources the entity is attached to
    pub fn is_scoped(self) -> bool {
        self == Self::Plugin
    }

    /// Field a dependent entity uses to reference an entity of this kind
    pub fn reference_field(self) -> Option<&'static str> {
        match self {
            Self::Service => Some("service"),
            Self::Route => Some("route"),
            Self::Consumer => Some("consumer"),
            Self::ConsumerGroup => Some("consumer_group"),
            Self::Certificate => Some("certificate"),
            Self::KeySet => Some("set"),
            _ => None,
        }
    }

    /// Kind referenced by a document field, if the field is a reference
    pub fn from_reference_field(field: &str) -> Option<Self> {
        match field {
            "service" => Some(Self::Service),
            "route" => Some(Self::Route),
            "consumer" => Some(Self::Consumer),
            "consumer_group" => Some(Self::ConsumerGroup),
            "certificate" => Some(Self::Certificate),
            "set" => Some(Self::KeySet),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    /// Accepts plural or singular labels, with `-` or `_` separators
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.plural() == normalized || kind.singular() == normalized)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// The six consumer credential kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    KeyAuth,
    BasicAuth,
    Jwt,
    Oauth2,
    Acl,
    HmacAuth,
}

impl CredentialKind {
    /// Sub-endpoint under `/consumers/{id}/`
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::KeyAuth => "key-auth",
            Self::BasicAuth => "basic-auth",
            Self::Jwt => "jwt",
            Self::Oauth2 => "oauth2",
            Self::Acl => "acls",
            Self::HmacAuth => "hmac-auth",
        }
    }

    /// Field holding this credential list inside a consumer document
    pub fn field(self) -> &'static str {
        match self {
            Self::KeyAuth => "keyauth_credentials",
            Self::BasicAuth => "basicauth_credentials",
            Self::Jwt => "jwt_secrets",
            Self::Oauth2 => "oauth2_credentials",
            Self::Acl => "acls",
            Self::HmacAuth => "hmacauth_credentials",
        }
    }

    /// Field that identifies one credential within its consumer
    pub fn natural_key(self) -> &'static str {
        match self {
            Self::KeyAuth | Self::Jwt => "key",
            Self::BasicAuth | Self::HmacAuth => "username",
            Self::Oauth2 => "client_id",
            Self::Acl => "group",
        }
    }
}

/// A collection that only exists underneath a parent entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResource {
    /// Upstream targets
    Targets,
    /// Consumer credentials
    Credential(CredentialKind),
}

impl SubResource {
    /// Path segment below the parent entity
    pub fn path(self) -> &'static str {
        match self {
            Self::Targets => "targets",
            Self::Credential(kind) => kind.endpoint(),
        }
    }

    /// Field holding the nested list inside the parent document
    pub fn field(self) -> &'static str {
        match self {
            Self::Targets => "targets",
            Self::Credential(kind) => kind.field(),
        }
    }

    /// Kind of the owning entity
    pub fn parent(self) -> EntityKind {
        match self {
            Self::Targets => EntityKind::Upstream,
            Self::Credential(_) => EntityKind::Consumer,
        }
    }

    /// Back-reference field the store adds to each nested record
    pub fn parent_field(self) -> &'static str {
        match self {
            Self::Targets => "upstream",
            Self::Credential(_) => "consumer",
        }
    }

    pub fn natural_key(self) -> &'static str {
        match self {
            Self::Targets => "target",
            Self::Credential(kind) => kind.natural_key(),
        }
    }
}

impl fmt::Display for SubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("services", EntityKind::Service)]
    #[case("service", EntityKind::Service)]
    #[case("ca-certificates", EntityKind::CaCertificate)]
    #[case("Consumer_Groups", EntityKind::ConsumerGroup)]
    #[case("plugin", EntityKind::Plugin)]
    fn parses_kind_labels(#[case] label: &str, #[case] expected: EntityKind) {
        assert_eq!(label.parse::<EntityKind>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "widgets".parse::<EntityKind>().unwrap_err();
        assert!(err.to_string().contains("widgets"));
    }

    #[test]
    fn all_is_sorted_by_rank() {
        let ranks: Vec<u8> = EntityKind::ALL.iter().map(|k| k.rank()).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn references_point_to_lower_ranks() {
        for kind in EntityKind::ALL {
            for child in kind.info().children {
                assert!(
                    kind.rank() < child.rank(),
                    "{} must rank below its child {}",
                    kind,
                    child
                );
            }
        }
    }

    #[test]
    fn consumer_has_six_credential_endpoints() {
        let nested = EntityKind::Consumer.info().nested;
        let endpoints: Vec<&str> = nested.iter().map(|s| s.path()).collect();
        assert_eq!(
            endpoints,
            vec!["key-auth", "basic-auth", "jwt", "oauth2", "acls", "hmac-auth"]
        );
    }

    #[test]
    fn kind_serializes_as_plural_label() {
        let json = serde_json::to_string(&EntityKind::ConsumerGroup).unwrap();
        assert_eq!(json, "\"consumer_groups\"");
    }
}

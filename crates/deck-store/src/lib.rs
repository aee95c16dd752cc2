//! Entity store contract for decksync
//!
//! This crate is the leaf layer of the workspace. It defines:
//!
//! - **EntityKind registry**: the closed set of gateway entity kinds with their
//!   plural labels, dependency ranks and nested sub-resources
//! - **EntityStore**: blocking CRUD over one entity kind at a time
//! - **Adapters**: [`HttpStore`] for the Gateway admin API and the control-plane
//!   API, and [`MemoryStore`] for tests and offline planning
//!
//! # Architecture
//!
//! ```text
//!              deck-cli
//!                 |
//!             deck-core
//!                 |
//!             deck-store
//!            /          \
//!      HttpStore      MemoryStore
//! ```

pub mod error;
pub mod http;
pub mod kind;
pub mod memory;
pub mod record;
pub mod store;

pub use error::{Error, Result};
pub use http::{HttpStore, HttpStoreConfig};
pub use kind::{CredentialKind, EntityKind, KindInfo, SubResource};
pub use memory::MemoryStore;
pub use record::{EntityRecord, record_id, record_label, reference_label};
pub use store::{EntityStore, Scope, StoreRole};

//! Shared test fixtures for the decksync workspace.
//!
//! This crate is a dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`entities`] - JSON documents for the common entity kinds
//! - [`stores`] - seeded [`MemoryStore`](deck_store::MemoryStore) pairs for sync scenarios
//! - [`project`] - [`TestProject`] temporary project directory with settings and audit dir

pub mod entities;
pub mod project;
pub mod stores;

pub use project::TestProject;

//! grano-loader: idempotent loading of entities and relations into grano.
//!
//! Builders describe records by schemata and properties. Saving a builder
//! looks the record up by its unique properties and updates the match or
//! creates a new one, serialized per signature so concurrent saves of the
//! same record never create duplicates.

pub mod builder;
pub mod config;
pub mod entity;
pub mod error;
pub mod loader;
pub mod locks;
pub mod records;
pub mod relation;
pub mod signature;

pub use builder::{BuildState, Diagnostic, UniqueCriterion};
pub use entity::EntityBuilder;
pub use error::{LoaderError, Result};
pub use loader::{LoadStats, Loader};
pub use locks::LockTable;
pub use records::LoadReport;
pub use relation::RelationBuilder;
pub use signature::{Signature, SignatureKey, SignaturePart};

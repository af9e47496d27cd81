//! grano-client: REST client for the grano graph-data service.
//!
//! Resources (projects, entities, relations, schemata) are thin proxies over
//! the JSON documents the server returns. Collections hand out immutable,
//! filterable queries whose cursors page through results lazily.

pub mod client;
pub mod collection;
pub mod entity;
pub mod grano;
pub mod project;
pub mod query;
pub mod relation;
pub mod schema;
pub mod test_support;
pub mod transport;

pub use client::Client;
pub use collection::{Collection, Resource};
pub use entity::{Entity, EntityCollection};
pub use grano::Grano;
pub use project::{Project, ProjectCollection};
pub use query::{alias_filter, property_filter, Cursor, Page, Query};
pub use relation::{Relation, RelationCollection};
pub use schema::{Schema, SchemaCollection};
pub use transport::{ApiRequest, HttpTransport, Method, RawResponse, Transport};

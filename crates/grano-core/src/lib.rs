//! grano-core: Shared types, configuration, and error handling for the grano client.
//!
//! This crate provides the foundational types used across the workspace:
//! - Properties, property values and file attachments sent to the server
//! - A typed view over the JSON documents the server returns
//! - Client configuration management
//! - The error taxonomy for server interaction

pub mod config;
pub mod error;
pub mod types;

pub use config::ClientConfig;
pub use error::{GranoError, Result, ServerFault};
pub use types::{FileBlob, FileSet, Property, PropertyValue, ResourceData};

//! Error types for the grano-loader crate.

use grano_core::GranoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Grano error: {0}")]
    Grano(#[from] GranoError),

    /// A declared unique property is unset, retracted, or holds a file.
    #[error("Unique property '{property}' has no value")]
    MissingUniqueValue { property: String },

    #[error("Relation {endpoint} entity could not be resolved")]
    UnresolvedEndpoint { endpoint: &'static str },

    #[error("{kind} builder failed to resolve: {message}")]
    Unresolved { kind: &'static str, message: String },

    #[error("Invalid record on line {line}: {message}")]
    Records { line: usize, message: String },

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    /// Whether this wraps a server-side validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Grano(e) if e.is_validation())
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Error details reported by the grano server in an error response body.
///
/// The server answers failed requests with `{status, name, message, description}`;
/// `message` falls back to `description` when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerFault {
    pub status: Option<u16>,
    pub name: Option<String>,
    pub message: Option<String>,
    pub description: Option<String>,
    pub data: Value,
}

impl ServerFault {
    /// Extract fault details from a decoded response body.
    pub fn from_body(body: &Value) -> Self {
        let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
        let description = text("description");
        Self {
            status: body
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok()),
            name: text("name"),
            message: text("message").or_else(|| description.clone()),
            description,
            data: body.clone(),
        }
    }
}

impl fmt::Display for ServerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status}")?,
            None => write!(f, "-")?,
        }
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        write!(f, ": {}", self.message.as_deref().unwrap_or("no message"))
    }
}

/// Top-level error type for interaction with a grano server.
#[derive(Error, Debug)]
pub enum GranoError {
    /// The server was unreachable, timed out, or did not answer with JSON.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(ServerFault),

    /// The submitted data did not pass server-side validation.
    #[error("Invalid request: {0}")]
    Validation(ServerFault),

    #[error("Server error: {0}")]
    Server(ServerFault),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{resource} document has no `{field}` field")]
    MissingField {
        resource: &'static str,
        field: &'static str,
    },
}

impl GranoError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// The server-reported details, for errors that carry them.
    pub fn fault(&self) -> Option<&ServerFault> {
        match self {
            Self::NotFound(f) | Self::Validation(f) | Self::Server(f) => Some(f),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for GranoError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GranoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fault_message_falls_back_to_description() {
        let fault = ServerFault::from_body(&json!({
            "status": 400,
            "name": "Invalid",
            "description": "name: Required"
        }));
        assert_eq!(fault.status, Some(400));
        assert_eq!(fault.message.as_deref(), Some("name: Required"));
        assert_eq!(fault.description.as_deref(), Some("name: Required"));
    }

    #[test]
    fn test_error_display() {
        let fault = ServerFault::from_body(&json!({"status": 404, "message": "No such entity"}));
        let err = GranoError::NotFound(fault);
        assert_eq!(err.to_string(), "Not found: 404: No such entity");
        assert!(!err.is_validation());
        assert!(err.fault().is_some());
    }
}

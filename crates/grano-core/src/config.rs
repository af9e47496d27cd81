//! Configuration management for the grano client.
//!
//! Configuration is loaded from (in priority order):
//! 1. Explicit overrides (CLI flags, constructor arguments)
//! 2. Environment variables (GRANO_ prefix: GRANO_HOST, GRANO_APIKEY, ...)
//! 3. Config file (`~/.grano.ini`, `[client]` section)
//! 4. Defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_HOST: &str = "http://localhost:5000";
pub const DEFAULT_PREFIX: &str = "/api/1/";

/// Connection settings for a grano server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Host URL without path information (e.g. `http://grano.io`).
    #[serde(default = "default_host")]
    pub host: String,

    /// API key of the user running the requests.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path prefix of the grano API.
    #[serde(default = "default_prefix")]
    pub api_prefix: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_key: None,
            api_prefix: default_prefix(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `~/.grano.ini` and `GRANO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::load(default_config_path().as_deref())
    }

    /// Load configuration from the given INI file (optional) and `GRANO_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, "GRANO")
    }

    /// Like [`ClientConfig::load`], reading environment variables with a custom prefix.
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::new(&path.to_string_lossy(), config::FileFormat::Ini)
                    .required(false),
            );
        }
        let cfg = builder
            .add_source(config::Environment::with_prefix(env_prefix).try_parsing(true))
            .build()?;

        let defaults = Self::default();
        let lookup = |env_key: &str, file_key: &str| {
            cfg.get_string(env_key)
                .or_else(|_| cfg.get_string(&format!("client.{file_key}")))
                .ok()
        };

        let loaded = Self {
            host: lookup("host", "host").unwrap_or(defaults.host),
            api_key: lookup("apikey", "api_key").filter(|k| !k.is_empty()),
            api_prefix: lookup("prefix", "api_prefix").unwrap_or(defaults.api_prefix),
            timeout_secs: lookup("timeout_secs", "timeout_secs")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        };

        tracing::debug!(host = %loaded.host, prefix = %loaded.api_prefix, "Loaded client config");
        Ok(loaded)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The URL every endpoint path is appended to.
    ///
    /// A trailing `/` on the host and a leading `/` on the prefix are not doubled.
    pub fn base_url(&self) -> String {
        let prefix = if self.host.ends_with('/') {
            self.api_prefix.trim_start_matches('/')
        } else {
            self.api_prefix.as_str()
        };
        format!("{}{}", self.host, prefix)
    }
}

/// `~/.grano.ini`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".grano.ini"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "http://localhost:5000");
        assert_eq!(config.api_prefix, "/api/1/");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.base_url(), "http://localhost:5000/api/1/");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = ClientConfig::default().with_host("http://grano.io/");
        assert_eq!(config.base_url(), "http://grano.io/api/1/");
    }

    #[test]
    fn test_load_from_ini_file() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(file, "[client]\nhost = http://grano.example\napi_key = secret").unwrap();

        let config =
            ClientConfig::load_with_prefix(Some(file.path()), "GRANO_TEST_INI_ONLY").unwrap();
        assert_eq!(config.host, "http://grano.example");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.api_prefix, "/api/1/");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(file, "[client]\nhost = http://from-file\napi_key = file-key").unwrap();
        std::env::set_var("GRANO_TEST_ENV_HOST", "http://from-env");

        let config =
            ClientConfig::load_with_prefix(Some(file.path()), "GRANO_TEST_ENV").unwrap();
        assert_eq!(config.host, "http://from-env");
        assert_eq!(config.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ClientConfig::load_with_prefix(
            Some(Path::new("/nonexistent/grano.ini")),
            "GRANO_TEST_MISSING",
        )
        .unwrap();
        assert_eq!(config, ClientConfig::default());
    }
}

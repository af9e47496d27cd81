//! Configuration for the grano-load record loader.

use std::path::Path;

use serde::Deserialize;

use crate::error::{LoaderError, Result};

/// Settings of one load run.
///
/// Loaded from the `[load]` section of the grano INI file or
/// `GRANO_LOAD__*` environment variables; CLI flags override both.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoadConfig {
    /// Slug of the target project.
    #[serde(default)]
    pub project: String,

    /// Default source URL for every property loaded.
    #[serde(default)]
    pub source_url: Option<String>,

    /// Maximum concurrent saves.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            source_url: None,
            workers: default_workers(),
        }
    }
}

impl LoadConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, "GRANO")
    }

    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::new(&path.to_string_lossy(), config::FileFormat::Ini)
                    .required(false),
            );
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;

        match cfg.get::<LoadConfig>("load") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(config_error(e)),
        }
    }
}

fn config_error(e: config::ConfigError) -> LoaderError {
    LoaderError::Grano(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = LoadConfig::default();
        assert_eq!(config.workers, 4);
        assert!(config.project.is_empty());
        assert_eq!(config.source_url, None);
    }

    #[test]
    fn test_load_from_ini_section() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(
            file,
            "[client]\nhost = http://grano.example\n\n[load]\nproject = demo\nworkers = 8\nsource_url = http://example.org/data"
        )
        .unwrap();

        let config = LoadConfig::load_with_prefix(Some(file.path()), "GRANO_TEST_LOAD_INI").unwrap();
        assert_eq!(config.project, "demo");
        assert_eq!(config.workers, 8);
        assert_eq!(config.source_url.as_deref(), Some("http://example.org/data"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(file, "[load]\nproject = demo\nworkers = 8").unwrap();

        std::env::set_var("GRANO_TEST_LOAD_ENV_LOAD__WORKERS", "2");
        let config = LoadConfig::load_with_prefix(Some(file.path()), "GRANO_TEST_LOAD_ENV").unwrap();
        std::env::remove_var("GRANO_TEST_LOAD_ENV_LOAD__WORKERS");

        assert_eq!(config.project, "demo");
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_missing_section_falls_back_to_defaults() {
        let config = LoadConfig::load_with_prefix(None, "GRANO_TEST_LOAD_NONE").unwrap();
        assert_eq!(config, LoadConfig::default());
    }
}

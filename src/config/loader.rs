//! Configuration loader
//!
//! Layers, lowest priority first: built-in defaults, JSON file, environment.

use config::{Config, Environment, File, FileFormat};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use super::defaults::ENV_PREFIX;
use super::RelaySettings;
use crate::common::Result;

/// Loads [`RelaySettings`] from an optional JSON file and prefixed environment variables
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from this JSON file; a missing file is skipped with a warning
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use a different environment prefix (default `UTILKIT_RELAY`)
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Build the layered settings
    pub fn load(&self) -> Result<RelaySettings> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            if path.exists() {
                info!("Loading configuration from file: {}", path.display());
                builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Json));
            } else {
                warn!("Configuration file not found: {}", path.display());
            }
        }

        debug!("Reading environment variables with prefix {}_", self.env_prefix);
        builder = builder.add_source(Environment::with_prefix(&self.env_prefix).try_parsing(true));

        let settings: RelaySettings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_load_defaults() {
        let settings = ConfigLoader::new()
            .with_env_prefix("UTILKIT_TEST_NOTHING")
            .load()
            .unwrap();
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    #[serial]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        fs::write(
            &path,
            r#"{"listen": "127.0.0.1:9000", "remote": "127.0.0.1:8000", "buffer_size": 16384}"#,
        )
        .unwrap();

        let settings = ConfigLoader::new()
            .with_file(&path)
            .with_env_prefix("UTILKIT_TEST_NOTHING")
            .load()
            .unwrap();
        assert_eq!(settings.listen, "127.0.0.1:9000");
        assert_eq!(settings.remote, "127.0.0.1:8000");
        assert_eq!(settings.buffer_size, 16384);
        assert_eq!(settings.connect_timeout, 30);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_skipped() {
        let settings = ConfigLoader::new()
            .with_file("does-not-exist.json")
            .with_env_prefix("UTILKIT_TEST_NOTHING")
            .load()
            .unwrap();
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        fs::write(&path, r#"{"connect_timeout": 5, "tls_upstream": false}"#).unwrap();

        std::env::set_var("UTILKIT_LOADERTEST_CONNECT_TIMEOUT", "12");
        std::env::set_var("UTILKIT_LOADERTEST_TLS_UPSTREAM", "true");
        let settings = ConfigLoader::new()
            .with_file(&path)
            .with_env_prefix("UTILKIT_LOADERTEST")
            .load();
        std::env::remove_var("UTILKIT_LOADERTEST_CONNECT_TIMEOUT");
        std::env::remove_var("UTILKIT_LOADERTEST_TLS_UPSTREAM");

        let settings = settings.unwrap();
        assert_eq!(settings.connect_timeout, 12);
        assert!(settings.tls_upstream);
    }
}

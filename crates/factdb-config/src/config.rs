//! Configuration types and loading.
//!
//! The main entry point is [`Config`], the contents of
//! `.factdb/config.yaml`, loaded with [`load_config`] and saved with
//! [`save_config`]. All fields use serde defaults so a partial file
//! deserialises cleanly. Environment overrides (`FACTDB_*`) are resolved by
//! the CLI layer on top of the loaded file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// No `.factdb/` directory was found.
    #[error("no .factdb directory found (run 'fq init' first)")]
    DirNotFound,
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Replication configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicationConfig {
    /// Push after every commit (pull stays explicit).
    #[serde(default)]
    pub enabled: bool,

    /// Path to the shared replication log. Relative paths resolve against
    /// the `.factdb/` directory.
    #[serde(default)]
    pub log: Option<String>,
}

/// The full factdb configuration, corresponding to `.factdb/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store database filename or path. Relative paths resolve against the
    /// `.factdb/` directory.
    #[serde(default = "default_store")]
    pub store: String,

    /// Client name stamped on changesets (the part before the colon).
    #[serde(default = "default_client")]
    pub client: String,

    /// User name stamped on changesets (the part after the colon). Empty
    /// means "resolve from the environment".
    #[serde(default)]
    pub user: Option<String>,

    /// Replication settings.
    #[serde(default)]
    pub replication: ReplicationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: default_store(),
            client: default_client(),
            user: None,
            replication: ReplicationConfig::default(),
        }
    }
}

fn default_store() -> String {
    "factdb.db".to_owned()
}

fn default_client() -> String {
    "fq".to_owned()
}

impl Config {
    /// The store path resolved against the `.factdb/` directory.
    pub fn store_path(&self, factdb_dir: &Path) -> PathBuf {
        resolve(factdb_dir, &self.store)
    }

    /// The replication log path resolved against the `.factdb/` directory,
    /// when one is configured.
    pub fn replication_log_path(&self, factdb_dir: &Path) -> Option<PathBuf> {
        self.replication
            .log
            .as_deref()
            .map(|log| resolve(factdb_dir, log))
    }
}

fn resolve(factdb_dir: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        factdb_dir.join(path)
    }
}

/// Load configuration from `config.yaml` inside the given `.factdb/`
/// directory. A missing or empty file yields the defaults.
pub fn load_config(factdb_dir: &Path) -> Result<Config> {
    let config_path = factdb_dir.join("config.yaml");

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&config_path)?;
    if content.trim().is_empty() {
        return Ok(Config::default());
    }

    Ok(serde_yaml::from_str(&content)?)
}

/// Save configuration to `config.yaml` inside the given `.factdb/`
/// directory, creating the directory if needed.
pub fn save_config(factdb_dir: &Path, config: &Config) -> Result<()> {
    std::fs::create_dir_all(factdb_dir)?;
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(factdb_dir.join("config.yaml"), yaml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.store, "factdb.db");
        assert_eq!(config.client, "fq");
        assert!(!config.replication.enabled);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "client: repl\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.client, "repl");
        assert_eq!(config.store, "factdb.db");
    }

    #[test]
    fn replication_section_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.replication.enabled = true;
        config.replication.log = Some("shared/log.db".to_owned());
        save_config(dir.path(), &config).unwrap();

        let back = load_config(dir.path()).unwrap();
        assert!(back.replication.enabled);
        assert_eq!(
            back.replication_log_path(dir.path()),
            Some(dir.path().join("shared/log.db"))
        );
    }

    #[test]
    fn paths_resolve_relative_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        assert_eq!(config.store_path(dir.path()), dir.path().join("factdb.db"));

        let absolute = Config {
            store: "/tmp/elsewhere.db".to_owned(),
            ..Config::default()
        };
        assert_eq!(
            absolute.store_path(dir.path()),
            PathBuf::from("/tmp/elsewhere.db")
        );
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "store: [unclosed").unwrap();
        assert!(matches!(
            load_config(dir.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}

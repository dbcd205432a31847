//! Editor configuration from signalbook.toml

use crate::autosave::{AutoSaveTiming, DEFAULT_DEBOUNCE, DEFAULT_GRACE, DEFAULT_SAVED_RESET};
use crate::server::{ServerConfig, DEFAULT_BIND, DEFAULT_MAX_BODY_BYTES};
use crate::store::DEFAULT_BACKUP_FILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "signalbook.toml";

/// Main configuration from signalbook.toml
///
/// Every field is optional in the file; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Backup file used by the local store and by `serve`
    pub backup_path: PathBuf,

    /// Persistence endpoint settings
    pub server: ServerSection,

    /// Autosave timing
    pub autosave: AutoSaveSection,

    /// Remote persistence service
    pub remote: RemoteSection,

    /// AI generation endpoints
    pub generator: GeneratorSection,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            backup_path: PathBuf::from(DEFAULT_BACKUP_FILE),
            server: ServerSection::default(),
            autosave: AutoSaveSection::default(),
            remote: RemoteSection::default(),
            generator: GeneratorSection::default(),
        }
    }
}

/// `[server]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address
    pub bind: String,

    /// Largest accepted save request body, in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// `[autosave]` table, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveSection {
    pub debounce_ms: u64,
    pub grace_ms: u64,
    pub saved_reset_ms: u64,
}

impl Default for AutoSaveSection {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            grace_ms: DEFAULT_GRACE.as_millis() as u64,
            saved_reset_ms: DEFAULT_SAVED_RESET.as_millis() as u64,
        }
    }
}

/// `[remote]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Base URL of a persistence service; the backup file is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// `[generator]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSection {
    /// Slide generation endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,

    /// Image generation endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl EditorConfig {
    /// Load configuration from a signalbook.toml file
    ///
    /// # Parameters
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(EditorConfig)` - Successfully loaded configuration
    /// * `Err(ConfigError)` - Error reading or parsing the configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(ConfigError::IoError)?;

        let config: EditorConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;

        Ok(config)
    }

    /// Load configuration, using defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(&path) {
            Err(ConfigError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
                log::debug!(
                    "No configuration at {}, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Save configuration to a signalbook.toml file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;

        fs::write(&path, content).map_err(ConfigError::IoError)?;

        Ok(())
    }

    /// Autosave timing as durations
    pub fn autosave_timing(&self) -> AutoSaveTiming {
        AutoSaveTiming {
            debounce: Duration::from_millis(self.autosave.debounce_ms),
            grace: Duration::from_millis(self.autosave.grace_ms),
            saved_reset: Duration::from_millis(self.autosave.saved_reset_ms),
        }
    }

    /// Server settings from the `[server]` table and the backup path
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.server.bind.clone(),
            backup_path: self.backup_path.clone(),
            max_body_bytes: self.server.max_body_bytes,
        }
    }
}

/// Errors that can occur when loading or saving the configuration
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
    /// IO error when reading or writing file
    IoError(std::io::Error),

    /// Error parsing TOML
    ParseError(toml::de::Error),

    /// Error serializing to TOML
    SerializeError(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "TOML parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "TOML serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: EditorConfig = toml::from_str("").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.backup_path, PathBuf::from("content-backup.json"));
        assert_eq!(config.server.bind, "127.0.0.1:9002");
        assert_eq!(config.autosave_timing(), AutoSaveTiming::default());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_content = r#"
backup_path = "data/backup.json"

[autosave]
debounce_ms = 750

[remote]
base_url = "http://192.168.1.20:9002"

[generator]
content_url = "http://localhost:3400/generate-content"
"#;

        let config: EditorConfig = toml::from_str(toml_content).unwrap();

        assert_eq!(config.backup_path, PathBuf::from("data/backup.json"));
        assert_eq!(config.autosave.debounce_ms, 750);
        assert_eq!(config.autosave.grace_ms, 500);
        assert_eq!(config.remote.base_url.as_deref(), Some("http://192.168.1.20:9002"));
        assert!(config.generator.image_url.is_none());
        assert_eq!(config.server_config().backup_path, PathBuf::from("data/backup.json"));
    }

    #[test]
    fn test_load_or_default_and_save_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let missing = EditorConfig::load_or_default(&path).unwrap();
        assert_eq!(missing, EditorConfig::default());

        let mut config = EditorConfig::default();
        config.server.max_body_bytes = 1024;
        config.generator.image_url = Some("http://localhost:3400/generate-image".to_string());
        config.save(&path).unwrap();

        assert_eq!(EditorConfig::load_or_default(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "backup_path = [").unwrap();
        assert!(matches!(
            EditorConfig::load_or_default(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}

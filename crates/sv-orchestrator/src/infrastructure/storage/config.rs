//! TOML-based configuration persistence.
//!
//! Reads and writes [`Config`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\ScreenView\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/screenview/config.toml` or `~/.config/screenview/config.toml`
//! - macOS:    `~/Library/Application Support/ScreenView/config.toml`
//!
//! ```toml
//! start_as_direct_host = true
//! direct_host_port = "9051"
//! start_as_signal_host = false
//! signal_server_reliable = "example.com:69"
//! signal_server_unreliable = "example.com:420"
//! ```
//!
//! # Atomic saves
//!
//! [`save_config`] writes to a sibling `config.toml.tmp` and renames it over
//! the real file.  A crash mid-write leaves either the old file or the new
//! one, never a truncated mix.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sv_core::Config;
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ScreenView"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("screenview"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ScreenView")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Load / save ───────────────────────────────────────────────────────────────

/// Loads [`Config`] from `path`, returning the defaults if the file does not
/// exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Like [`load_config`], but falls back to the defaults on any error.
pub fn load_config_or_default(path: &Path) -> Config {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), "ignoring unreadable config: {e}");
            Config::default()
        }
    }
}

/// Persists `config` to `path`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content).map_err(|source| ConfigError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

// ── Store abstraction ─────────────────────────────────────────────────────────

/// Where the orchestrator loads and saves its configuration.
pub trait ConfigStore: Send + Sync {
    /// Current persisted configuration; defaults when absent or corrupt.
    fn load(&self) -> Config;

    /// Replaces the persisted configuration.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from the backing store.
    fn save(&self, config: &Config) -> Result<(), ConfigError>;
}

/// A TOML file on disk.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store at the platform default location.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoPlatformConfigDir`] if no location can be determined.
    pub fn platform_default() -> Result<Self, ConfigError> {
        Ok(Self::new(config_file_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        load_config_or_default(&self.path)
    }

    fn save(&self, config: &Config) -> Result<(), ConfigError> {
        save_config(&self.path, config)
    }
}

/// An in-memory store, for tests and for runs without a writable config dir.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<Config>,
    saves: Mutex<usize>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, config: &Config) -> Result<(), ConfigError> {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config.clone();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        // Act
        let config = load_config(&path).expect("absent file is not an error");

        // Assert
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            start_as_signal_host: true,
            static_password: Some("hunter2".to_string()),
            ..Config::default()
        };

        // Act
        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();

        // Assert
        assert_eq!(loaded, config);
        assert!(!path.with_extension("toml.tmp").exists(), "temp file must be renamed away");
    }

    #[test]
    fn test_corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "start_as_direct_host = \"yes please\"").unwrap();

        assert_eq!(load_config_or_default(&path), Config::default());
    }

    #[test]
    fn test_none_static_password_is_omitted_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        save_config(&path, &Config::default()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("static_password"));
    }

    #[test]
    fn test_file_store_persists_through_trait() {
        let dir = tempfile::tempdir().unwrap();
        let store: Box<dyn ConfigStore> = Box::new(FileConfigStore::new(dir.path().join("c.toml")));
        let config = Config {
            direct_host_port: "7777".to_string(),
            ..Config::default()
        };

        store.save(&config).unwrap();

        assert_eq!(store.load().direct_host_port, "7777");
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryConfigStore::default();

        store.save(&Config::default()).unwrap();
        store.save(&Config::default()).unwrap();

        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // NoPlatformConfigDir in a stripped CI environment is also acceptable.
    }
}

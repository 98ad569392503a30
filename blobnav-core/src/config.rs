//! src/config.rs
//! ============================================================================
//! # Config: Application Configuration Loader and Saver
//!
//! Manages all user-editable settings: key bindings and sequence timing, page
//! size, download defaults and logging. Loads and saves TOML from the
//! platform config directory located with the
//! [`directories`](https://docs.rs/directories) crate.
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! let options = config.download.options.clone();
//! ```

use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use tokio::fs as TokioFs;

use crate::controller::actions::BindingAction;
use crate::controller::key_sequence::BindingTable;
use crate::error::AppError;
use crate::model::download_session::DownloadOptions;
use crate::storage::backend::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "blobnav";
const APPLICATION: &str = "blobnav";

/// Hold-to-repeat emulation for the selection keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyRepeatConfig {
    pub enabled: bool,

    /// Delay between the first press and the first synthetic repeat.
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Repeats closer together than this are OS auto-repeat and dropped.
    #[serde(with = "humantime_serde")]
    pub min_inter_arrival: Duration,
}

impl Default for KeyRepeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(400),
            interval: Duration::from_millis(50),
            min_inter_arrival: Duration::from_millis(25),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeymapConfig {
    /// Pause after which a pending sequence stops waiting for more keys.
    #[serde(with = "humantime_serde")]
    pub sequence_timeout: Duration,

    pub repeat: KeyRepeatConfig,

    pub bindings: BTreeMap<String, BindingAction>,
}

impl Default for KeymapConfig {
    fn default() -> Self {
        use BindingAction::*;

        let bindings = [
            ("j", MoveDown),
            ("k", MoveUp),
            ("l", Enter),
            ("h", Back),
            ("gg", SelectFirst),
            ("G", SelectLast),
            ("]", NextPage),
            ("[", PreviousPage),
            ("r", Refresh),
            ("d", Download),
            ("da", DownloadAll),
            ("x", CancelDownloads),
            ("/", Search),
            (":", Command),
            ("?", Help),
            ("q", Quit),
        ]
        .into_iter()
        .map(|(seq, action)| (seq.to_string(), action))
        .collect();

        Self {
            sequence_timeout: Duration::from_millis(500),
            repeat: KeyRepeatConfig::default(),
            bindings,
        }
    }
}

impl KeymapConfig {
    pub fn binding_table(&self) -> Result<BindingTable, AppError> {
        BindingTable::from_pairs(
            self.bindings
                .iter()
                .map(|(seq, action)| (seq.as_str(), *action)),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub session_name: String,
    pub page_size: u32,
    pub delimiter: char,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            session_name: "default".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            delimiter: '/',
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DownloadConfig {
    /// Session root; files land in `<root>/<container>/<blob path>`.
    pub root: Option<PathBuf>,

    #[serde(flatten)]
    pub options: DownloadOptions,
}

impl DownloadConfig {
    /// Configured root, else `<user download dir>/blobnav`, else `./downloads`.
    #[must_use]
    pub fn resolved_root(&self) -> PathBuf {
        if let Some(root) = &self.root {
            return root.clone();
        }

        UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|d| d.join(APPLICATION)))
            .unwrap_or_else(|| PathBuf::from("downloads"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Main configuration struct for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub keymap: KeymapConfig,

    pub navigation: NavigationConfig,

    pub download: DownloadConfig,

    pub logging: LoggingConfig,
}

impl Config {
    /// Loads config from the platform config dir, writing defaults if absent.
    ///
    /// The config is expected at `$XDG_CONFIG_HOME/blobnav/config.toml`
    /// (Linux), or equivalent on Windows/macOS.
    pub async fn load() -> Result<Self, AppError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path).await
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save_to(&path).await?;

            Ok(default_config)
        }
    }

    /// Loads and validates config from an explicit path.
    pub async fn load_from(path: &Path) -> Result<Self, AppError> {
        info!("Loading config from {}", path.display());

        let text = TokioFs::read_to_string(path)
            .await
            .map_err(|source| AppError::ConfigIo {
                path: path.to_path_buf(),
                source,
            })?;
        let cfg: Self = toml::from_str(&text)?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Saves config to TOML at `path`.
    pub async fn save_to(&self, path: &Path) -> Result<(), AppError> {
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| AppError::invalid_input("config", e.to_string()))?;
        TokioFs::write(path, toml_str)
            .await
            .map_err(|source| AppError::ConfigIo {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.keymap.bindings.keys().any(String::is_empty) {
            return Err(AppError::invalid_input(
                "keymap.bindings",
                "key sequence must not be empty",
            ));
        }

        if self.navigation.page_size == 0 || self.navigation.page_size > MAX_PAGE_SIZE {
            return Err(AppError::invalid_input(
                "navigation.page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }

        if self.download.options.buffer_size == 0 {
            return Err(AppError::invalid_input(
                "download.buffer_size",
                "must be greater than zero",
            ));
        }

        if self.download.options.timeout.is_zero() {
            return Err(AppError::invalid_input(
                "download.timeout",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> Result<PathBuf, AppError> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory for logs when none is configured.
    pub fn default_log_dir() -> Result<PathBuf, AppError> {
        Ok(Self::project_dirs()?.data_dir().join("logs"))
    }

    fn project_dirs() -> Result<ProjectDirs, AppError> {
        ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .ok_or_else(|| AppError::Other("Could not determine config directory.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::download_session::ConflictPolicy;

    #[test]
    fn test_default_keymap_builds_table() {
        let table = KeymapConfig::default().binding_table().unwrap();
        assert_eq!(table.get("gg"), Some(BindingAction::SelectFirst));
        assert!(table.has_longer_match("d"));
        assert_eq!(table.get("/"), Some(BindingAction::Search));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let text = r#"
            [keymap]
            sequence_timeout = "750ms"

            [navigation]
            page_size = 50

            [download]
            conflict_policy = "rename"
            max_bytes_per_second = 1048576
        "#;

        let cfg: Config = toml::from_str(text).unwrap();
        assert_eq!(cfg.keymap.sequence_timeout, Duration::from_millis(750));
        assert_eq!(cfg.navigation.page_size, 50);
        assert_eq!(cfg.navigation.delimiter, '/');
        assert_eq!(cfg.download.options.conflict_policy, ConflictPolicy::Rename);
        assert_eq!(cfg.download.options.max_bytes_per_second, Some(1_048_576));
        assert!(cfg.download.options.verify_checksum);
        assert!(!cfg.keymap.bindings.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut cfg = Config::default();
        cfg.navigation.page_size = 0;
        assert!(matches!(
            cfg.validate(),
            Err(AppError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.navigation.session_name = "work".into();
        cfg.save_to(&path).await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert_eq!(loaded.navigation.session_name, "work");
        assert_eq!(loaded.keymap.bindings.len(), cfg.keymap.bindings.len());
    }
}

//! Configuration manager - main API for config operations

use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult, LogLevel};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

/// Loads, saves and updates the config file in one directory.
///
/// `ConfigManager::new()` uses the platform config directory:
/// - Linux: `~/.config/folio/`
/// - macOS: `~/Library/Application Support/folio/`
/// - Windows: `%APPDATA%\folio\`
#[derive(Debug, Clone)]
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Self::with_directory(config_dir)
    }

    /// Creates a config manager with a custom config directory
    pub fn with_directory(config_dir: PathBuf) -> ConfigResult<Self> {
        let persistence = ConfigPersistence::new(config_dir.join(CONFIG_FILE));

        Ok(Self {
            persistence,
            config_dir,
        })
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "folio")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "Could not determine user config directory".to_string(),
            })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Path of the metadata store named by `config`
    pub fn store_path(&self, config: &Config) -> PathBuf {
        config.app.resolved_store_path(&self.config_dir)
    }

    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Loads the configuration, falling back to defaults on any error
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {}, using defaults", e);
                Config::default()
            }
        }
    }

    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Loads the config, applies `update_fn` and saves the result
    ///
    /// ```rust,no_run
    /// # use folio_config::ConfigManager;
    /// # let manager = ConfigManager::new().unwrap();
    /// manager.update(|config| {
    ///     config.tree.show_hidden = true;
    /// }).expect("Failed to update config");
    /// ```
    pub fn update<F>(&self, update_fn: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        update_fn(&mut config);
        self.save(&config)
    }

    /// Writes a default config file if none exists.
    ///
    /// Returns whether a file was created.
    pub fn initialize(&self) -> ConfigResult<bool> {
        let path = self.config_path();
        if path.exists() {
            log::info!("Config file already exists at {}", path.display());
            return Ok(false);
        }

        self.save(&Config::default())?;
        log::info!("Generated default config at {}", path.display());
        Ok(true)
    }

    pub fn reset(&self) -> ConfigResult<()> {
        self.save(&Config::default())
    }

    /// Returns the validation problems of the file on disk
    pub fn validate(&self) -> ConfigResult<Vec<String>> {
        let config = self.load()?;

        match config.validate() {
            Ok(()) => Ok(Vec::new()),
            Err(errors) => Ok(errors.iter().map(|e| e.to_string()).collect()),
        }
    }

    /// Loads the config and applies `FOLIO_SECTION_FIELD` environment overrides
    ///
    /// Recognised: `FOLIO_APP_LOG_LEVEL`, `FOLIO_APP_STORE_PATH` and
    /// `FOLIO_LIBRARY_BASE_PATHS` (platform path-list syntax).
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        apply_overrides(&mut config, |key| std::env::var_os(key));

        if let Err(errors) = config.validate() {
            log::warn!(
                "Config validation warnings after env overrides: {:?}",
                errors
            );
        }

        Ok(config)
    }
}

fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<std::ffi::OsString>,
{
    if let Some(level) = lookup("FOLIO_APP_LOG_LEVEL") {
        match level.to_string_lossy().parse::<LogLevel>() {
            Ok(level) => config.app.log_level = level,
            Err(e) => log::warn!("Ignoring FOLIO_APP_LOG_LEVEL: {}", e),
        }
    }

    if let Some(path) = lookup("FOLIO_APP_STORE_PATH") {
        config.app.store_path = PathBuf::from(path);
    }

    if let Some(paths) = lookup("FOLIO_LIBRARY_BASE_PATHS") {
        config.library.base_paths = std::env::split_paths(&paths)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
    }
}

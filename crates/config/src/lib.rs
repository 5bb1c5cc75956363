//! Folio configuration and preferences
//!
//! One TOML file holds every setting: application options, the library's
//! base paths and scan rules, and the tree preferences (including the
//! expansion state written back on shutdown).
//!
//! - **Sections**: each part of the file is a type implementing [`ConfigSection`]
//! - **Lenient loading**: invalid values are reported as warnings, not errors
//! - **Atomic writes**: a crash mid-save never leaves a truncated file
//!
//! # Example
//!
//! ```rust,no_run
//! use folio_config::{Config, ConfigManager};
//!
//! let manager = ConfigManager::new().expect("config directory");
//! let config = manager.load_or_default();
//! for path in &config.library.base_paths {
//!     println!("{}", path.display());
//! }
//! ```

mod error;
mod manager;
mod persistence;
mod validation;

pub mod app_config;
mod library_config;
mod tree_config;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::ConfigManager;
pub use persistence::ConfigPersistence;
pub use validation::{ConfigSection, Validator};

pub use app_config::{AppConfig, LogLevel};
pub use library_config::LibraryConfig;
pub use tree_config::TreeConfig;

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Config file format version
    pub version: u32,

    pub app: AppConfig,

    /// Base paths and scanning
    pub library: LibraryConfig,

    /// Tree display and saved expansion
    pub tree: TreeConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates every section, collecting all errors
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(mut e) = self.app.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.library.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.tree.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Overrides this config with `other`, section by section
    pub fn merge(&mut self, other: Config) {
        self.app.merge(other.app);
        self.library.merge(other.library);
        self.tree.merge(other.tree);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            app: AppConfig::default(),
            library: LibraryConfig::default(),
            tree: TreeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_errors_from_all_sections_collected() {
        let mut config = Config::default();
        config.app.store_path = PathBuf::new();
        config.library.progress_interval = 0;
        config.tree.expanded_paths = vec![Vec::new()];

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.tree.show_hidden = true;
        other.library.base_paths = vec![PathBuf::from("/books")];

        base.merge(other);
        assert!(base.tree.show_hidden);
        assert_eq!(base.library.base_paths, vec![PathBuf::from("/books")]);
    }
}

//! Tree display preferences and saved expansion

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TreeConfig {
    /// Show the documents and home folders as roots
    pub include_special_folders: bool,

    /// Show the filesystem roots (drives, `/`) as roots
    pub include_filesystem_roots: bool,

    /// List dot-files
    pub show_hidden: bool,

    /// Expanded nodes as name paths, first segment the root's path
    pub expanded_paths: Vec<Vec<String>>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            include_special_folders: true,
            include_filesystem_roots: true,
            show_hidden: false,
            expanded_paths: Vec::new(),
        }
    }
}

impl ConfigSection for TreeConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let results = self
            .expanded_paths
            .iter()
            .enumerate()
            .map(|(i, path)| match path.first() {
                Some(root) => Validator::not_empty(root, &format!("tree.expanded_paths[{}]", i)),
                None => Err(ValidationError::new(
                    format!("tree.expanded_paths[{}]", i),
                    "must name at least the root",
                )),
            })
            .collect();

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.include_special_folders = other.include_special_folders;
        self.include_filesystem_roots = other.include_filesystem_roots;
        self.show_hidden = other.show_hidden;
        self.expanded_paths = other.expanded_paths;
    }

    fn section_name(&self) -> &'static str {
        "tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TreeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_expanded_path_rejected() {
        let mut config = TreeConfig::default();
        config.expanded_paths = vec![vec!["/lib".to_string()], Vec::new(), vec![String::new()]];
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "tree.expanded_paths[1]");
    }

    #[test]
    fn test_expanded_paths_toml_shape() {
        let mut config = TreeConfig::default();
        config.expanded_paths = vec![vec!["/lib".to_string(), "sub".to_string()]];

        let text = toml::to_string(&config).unwrap();
        let parsed: TreeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}

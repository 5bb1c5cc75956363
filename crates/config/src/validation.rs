//! Validation helpers shared by the config sections

pub use crate::error::ValidationError;
use std::collections::HashSet;
use std::path::Path;

/// A section of the config file.
///
/// Sections validate themselves and know how to take overrides, so new
/// sections plug into [`Config`](crate::Config) without touching the others.
pub trait ConfigSection: Default {
    /// Returns every invalid field, or `Ok` when the section is usable
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Replaces this section's values with `other`'s
    fn merge(&mut self, other: Self);

    /// Table name in the TOML file
    fn section_name(&self) -> &'static str;
}

pub struct Validator;

impl Validator {
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            Err(ValidationError::with_value(
                field,
                format!("must be between {} and {}", min, max),
                value,
            ))
        } else {
            Ok(())
        }
    }

    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            Err(ValidationError::new(field, "must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Base paths are stored as given, so relative ones would depend on the
    /// working directory of whoever starts the program.
    pub fn absolute_path(path: &Path, field: &str) -> Result<(), ValidationError> {
        if path.is_absolute() {
            Ok(())
        } else {
            Err(ValidationError::with_value(
                field,
                "must be an absolute path",
                path.display(),
            ))
        }
    }

    pub fn no_duplicates<T>(values: &[T], field: &str) -> Result<(), ValidationError>
    where
        T: Eq + std::hash::Hash + std::fmt::Debug,
    {
        let mut seen = HashSet::new();
        match values.iter().find(|v| !seen.insert(*v)) {
            Some(duplicate) => Err(ValidationError::with_value(
                field,
                "contains a duplicate entry",
                format!("{:?}", duplicate),
            )),
            None => Ok(()),
        }
    }

    pub fn collect_errors(
        results: Vec<Result<(), ValidationError>>,
    ) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

//! Error types and recovery strategies for Folio
//!
//! The taxonomy mirrors what can go wrong while keeping a cached tree and a
//! metadata table in step with a filesystem that changes underneath them:
//! - **Io**: a listing or read failed; localized to one node, retry allowed
//! - **Rename**: the filesystem rejected a rename; the node is unchanged
//! - **NotFound**: the target is already gone; benign for delete-class calls
//! - **StaleState**: an asynchronous result outlived its target; discarded
//!
//! Each error carries a severity and a recovery action so callers can decide
//! between retrying, reporting to the user, or silently dropping the result.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::types::ResourcePath;

/// Recovery actions that can be taken when an error occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the operation (e.g. re-expand a node whose listing failed)
    Retry,
    /// Re-list the parent directory to pick up the current disk state
    RefreshParent,
    /// Drop the result; nothing to report
    Discard,
    /// Show the failure to the user and let them decide
    UserIntervention,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "Retry the operation"),
            Self::RefreshParent => write!(f, "Refresh the parent entry"),
            Self::Discard => write!(f, "Discard the result"),
            Self::UserIntervention => write!(f, "User intervention required"),
        }
    }
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected race with the filesystem, safe to ignore
    Benign,
    /// Operation failed but the model is intact
    Recoverable,
    /// Model or store cannot continue without user action
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Benign => write!(f, "Benign"),
            Self::Recoverable => write!(f, "Recoverable"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Main error type for Folio
#[derive(Error, Debug)]
pub enum FolioError {
    // ===== File System Errors =====
    /// Listing, reading or writing a resource failed
    #[error("I/O error on {path}: {message}")]
    Io {
        path: String,
        message: String,
        #[source]
        source: io::Error,
    },

    /// The filesystem rejected a rename
    #[error("Cannot rename {from} to {to}: {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: io::Error,
    },

    /// The targeted resource or node no longer exists
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// An asynchronous result arrived after its target changed or vanished
    #[error("Stale result for node {node}: {reason}")]
    StaleState { node: u64, reason: String },

    // ===== Library Errors =====
    /// Metadata store operation failed
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Metadata could not be read from an ebook
    #[error("Metadata error in {path}: {reason}")]
    Metadata { path: String, reason: String },

    // ===== Generic Errors =====
    /// Operation cancelled (e.g. a scan whose root was removed)
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Invalid argument provided
    #[error("Invalid argument: {argument} - {reason}")]
    InvalidArgument { argument: String, reason: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FolioError {
    /// Returns the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound { .. } | Self::StaleState { .. } | Self::Cancelled { .. } => {
                ErrorSeverity::Benign
            }

            Self::Io { .. }
            | Self::Rename { .. }
            | Self::Metadata { .. }
            | Self::InvalidArgument { .. } => ErrorSeverity::Recoverable,

            Self::Store { .. } | Self::Internal { .. } => ErrorSeverity::Fatal,
        }
    }

    /// Returns the recommended recovery action for this error
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            Self::Io { .. } => RecoveryAction::Retry,
            Self::Rename { .. } => RecoveryAction::RefreshParent,
            Self::NotFound { .. } => RecoveryAction::RefreshParent,
            Self::StaleState { .. } | Self::Cancelled { .. } => RecoveryAction::Discard,
            _ => RecoveryAction::UserIntervention,
        }
    }

    /// Returns a user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            Self::Io { path, .. } => format!("Cannot read {}. Try again to reload it.", path),
            Self::Rename { from, .. } => {
                format!("Renaming {} failed. The name may already be taken.", from)
            }
            Self::NotFound { .. } => {
                "The file was not found. It may have been moved or deleted.".to_string()
            }
            Self::StaleState { .. } => "The view was refreshed in the meantime.".to_string(),
            Self::Store { .. } => "The library database is unavailable.".to_string(),
            Self::Metadata { .. } => "Cannot read this ebook's information.".to_string(),
            Self::Cancelled { .. } => "Operation was cancelled.".to_string(),
            Self::InvalidArgument { .. } => "Invalid input provided.".to_string(),
            Self::Internal { .. } => {
                "An unexpected error occurred. Please try again.".to_string()
            }
        }
    }

    /// Returns true if this error should be logged at ERROR level
    pub fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Returns true for races with the filesystem that callers may ignore
    pub fn is_benign(&self) -> bool {
        self.severity() == ErrorSeverity::Benign
    }

    /// Helper to create an I/O error bound to a resource
    pub fn io(path: &ResourcePath, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound {
                resource: path.to_string(),
            };
        }
        Self::Io {
            path: path.to_string(),
            message: source.to_string(),
            source,
        }
    }

    /// Helper to create a rename error
    pub fn rename(from: &ResourcePath, to: &ResourcePath, source: io::Error) -> Self {
        Self::Rename {
            from: from.to_string(),
            to: to.to_string(),
            source,
        }
    }

    /// Helper to create a not-found error
    pub fn not_found(resource: impl fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
        }
    }

    /// Helper to create a store error from any error type
    pub fn store<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Convenience type alias for Results using FolioError
pub type Result<T> = std::result::Result<T, FolioError>;

//! Custom error types for the crate.
//!
//! This module defines the primary error type, `BitsError`, shared by the stored
//! dictionary, the configuration loaders and the run-metadata helpers. Using the
//! `thiserror` crate, it provides a centralized and consistent way to handle the
//! different kinds of errors that can occur, from I/O and parsing issues to values
//! that cannot be persisted.
//!
//! ## Error Hierarchy
//!
//! `BitsError` is an enum that consolidates the error sources:
//!
//! - **`Serialization`**: A key or value offered to a `StoredDict` cannot be represented
//!   in the JSON-compatible data model. Raised synchronously by the mutating call; the
//!   dictionary is left unchanged.
//! - **`ConfigFormat`**: A file exists but its contents cannot be parsed at all, or the
//!   parsed document is not a mapping.
//! - **`EmptyStore`** and **`KeyNotFound`**: Lookup failures. `EmptyStore` is the
//!   specialised form returned when popping from an empty dictionary; both answer
//!   `true` to [`BitsError::is_key_error`].
//! - **`Io`**: Wraps standard `std::io::Error`, e.g. a failed synchronous flush.
//! - **`ConfigNotFound`**, **`UnsupportedFormat`**, **`IConfigVersion`** and
//!   **`Configuration`**: Instrument configuration problems.
//!
//! By using `#[from]`, `BitsError` can be created from `std::io::Error` with the `?`
//! operator.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, BitsError>;

/// Errors raised by stored dictionaries and configuration loading.
#[derive(Error, Debug)]
pub enum BitsError {
    /// Key or value is not JSON serializable.
    #[error("Cannot store key {key}: {reason}")]
    Serialization {
        /// Offending key, rendered for humans.
        key: String,
        /// Why the entry was rejected.
        reason: String,
    },

    /// A file exists but could not be parsed.
    #[error("Cannot parse '{}': {reason}", .path.display())]
    ConfigFormat {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Pop from a dictionary with no entries.
    #[error("popitem(): dictionary is empty")]
    EmptyStore,

    /// Key is not present.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required configuration file does not exist.
    #[error("Configuration file '{}' does not exist", .0.display())]
    ConfigNotFound(PathBuf),

    /// Configuration file extension is not understood.
    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),

    /// Instrument configuration is older than this crate accepts.
    #[error(
        "Configuration file version too old. Found {found:?}. Expected minimum {minimum:?}. Configuration file '{}'.",
        .path.display()
    )]
    IConfigVersion {
        /// Version found in the file, if any.
        found: Option<String>,
        /// Minimum accepted version.
        minimum: String,
        /// Configuration file checked.
        path: PathBuf,
    },

    /// Semantic configuration error.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl BitsError {
    /// True for the lookup failures (`KeyNotFound` and its `EmptyStore` variant).
    pub fn is_key_error(&self) -> bool {
        matches!(self, BitsError::KeyNotFound(_) | BitsError::EmptyStore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BitsError::Serialization {
            key: "a".into(),
            reason: "mapping keys must be str, int, float, bool or null".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot store key a: mapping keys must be str, int, float, bool or null"
        );
    }

    #[test]
    fn test_empty_store_is_key_error() {
        assert!(BitsError::EmptyStore.is_key_error());
        assert!(BitsError::KeyNotFound("x".into()).is_key_error());
        assert!(!BitsError::Configuration("bad".into()).is_key_error());
        assert!(BitsError::EmptyStore.to_string().contains("dictionary is empty"));
    }

    #[test]
    fn test_version_error_mentions_file() {
        let err = BitsError::IConfigVersion {
            found: Some("1.0.0".into()),
            minimum: "2.0.0".into(),
            path: PathBuf::from("configs/iconfig.yml"),
        };
        let text = err.to_string();
        assert!(text.contains("version too old"));
        assert!(text.contains("\"1.0.0\""));
        assert!(text.contains("configs/iconfig.yml"));
    }
}

//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(garden::cache::io),
        help("Check permissions on the project's .garden directory")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create")
        operation: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(garden::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// A cache entry exists but could not be decoded
    #[error("Cache entry '{key}' is unreadable: {message}")]
    #[diagnostic(
        code(garden::cache::corrupt),
        help("The entry is ignored and recomputed on the next resolution")
    )]
    Corrupt {
        /// The cache key of the unreadable entry
        key: String,
        /// Decoder error message
        message: String,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a corrupt entry error
    #[must_use]
    pub fn corrupt(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: msg.into(),
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for garden-core

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Main error type for Garden core operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid project or action configuration, including dependency cycles
    #[error("Configuration error: {message}")]
    #[diagnostic(code(garden::config::invalid))]
    Configuration {
        /// Description of the configuration issue
        message: String,
        /// Suggestion for fixing it
        #[help]
        help: Option<String>,
    },

    /// A caller referenced something that does not exist
    #[error("Parameter error: {message}")]
    #[diagnostic(code(garden::parameter::invalid))]
    Parameter {
        /// Description of the bad parameter
        message: String,
    },

    /// A plugin handler failed
    #[error("Plugin '{plugin}' failed: {message}")]
    #[diagnostic(code(garden::plugin::failed))]
    Plugin {
        /// Plugin or provider name
        plugin: String,
        /// What went wrong
        message: String,
    },

    /// One or more tasks in a solve failed
    #[error("{message}")]
    #[diagnostic(
        code(garden::graph::failed),
        help("Run with RUST_LOG=garden_core=debug for per-task details")
    )]
    Graph {
        /// Summary of the failed tasks
        message: String,
        /// Keys of the failed tasks
        failed: Vec<String>,
    },

    /// I/O error with path context
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(code(garden::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed
        operation: String,
    },

    /// Serialization or deserialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(garden::serialization))]
    Serialization {
        /// Description of the serialization issue
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with a help hint
    #[must_use]
    pub fn configuration_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a parameter error
    #[must_use]
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter {
            message: message.into(),
        }
    }

    /// Create a plugin error
    #[must_use]
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a graph failure error
    #[must_use]
    pub fn graph(message: impl Into<String>, failed: Vec<String>) -> Self {
        Self::Graph {
            message: message.into(),
            failed,
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Short machine-readable category, used when rendering results
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Parameter { .. } => "parameter",
            Self::Plugin { .. } => "plugin",
            Self::Graph { .. } => "graph",
            Self::Io { .. } => "filesystem",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<garden_graph::Error> for Error {
    fn from(err: garden_graph::Error) -> Self {
        match &err {
            garden_graph::Error::CycleDetected { .. } => Self::configuration_with_help(
                err.to_string(),
                "Remove one of the dependencies in each cycle",
            ),
            garden_graph::Error::NodeNotFound { .. } => Self::configuration(err.to_string()),
        }
    }
}

impl From<garden_cache::Error> for Error {
    fn from(err: garden_cache::Error) -> Self {
        match err {
            garden_cache::Error::Io {
                source,
                path,
                operation,
            } => Self::Io {
                source,
                path,
                operation,
            },
            other => Self::serialization(other.to_string()),
        }
    }
}

/// Result type for Garden core operations
pub type Result<T> = std::result::Result<T, Error>;

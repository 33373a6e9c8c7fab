//! Error types for dependency graph operations.

use crate::cycles::format_cycle;
use std::fmt;

/// Result type for dependency graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during dependency graph queries.
///
/// Both variants describe a structural problem with the configured graph, so
/// callers surface them as configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// One or more dependency cycles prevent a total ordering.
    CycleDetected {
        /// The offending cycles, each in traversal order.
        cycles: Vec<Vec<String>>,
    },

    /// A query referenced a node that was never added.
    NodeNotFound {
        /// The unknown node ID.
        node: String,
    },
}

impl Error {
    /// The cycles carried by a [`Error::CycleDetected`] error, empty otherwise.
    #[must_use]
    pub fn cycles(&self) -> &[Vec<String>] {
        match self {
            Self::CycleDetected { cycles } => cycles,
            Self::NodeNotFound { .. } => &[],
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CycleDetected { cycles } => {
                let list = cycles
                    .iter()
                    .map(|cycle| format_cycle(cycle))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Circular dependencies detected: {list}")
            }
            Self::NodeNotFound { node } => {
                write!(f, "Node '{node}' does not exist in the dependency graph")
            }
        }
    }
}

impl std::error::Error for Error {}

//! Validation utilities for dependency graphs.

use crate::{DependencyGraph, Error};

/// Result of graph validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the graph is valid (no cycles).
    pub is_valid: bool,
    /// List of validation errors, if any.
    pub errors: Vec<Error>,
}

impl ValidationResult {
    /// Create a valid result.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    /// Create an invalid result with errors.
    #[must_use]
    pub fn invalid(errors: Vec<Error>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

impl DependencyGraph {
    /// Validate the graph structure.
    ///
    /// Reports every dependency cycle as a single [`Error::CycleDetected`],
    /// regardless of whether the graph was created with `allow_cycles`.
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        let cycles = self.detect_circular_dependencies();

        if cycles.is_empty() {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(vec![Error::CycleDetected { cycles }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphOptions;

    #[test]
    fn test_validate_empty_graph() {
        let graph = DependencyGraph::new();
        let result = graph.validate();
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_validate_valid_graph() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("b", "a");

        let result = graph.validate();
        assert!(result.is_valid);
    }

    #[test]
    fn test_validate_cyclic_graph() {
        let mut graph = DependencyGraph::with_options(GraphOptions { allow_cycles: true });
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "a");

        let result = graph.validate();
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].cycles().len(), 1);
    }
}

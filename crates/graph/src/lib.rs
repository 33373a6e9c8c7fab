//! Dependency graph algorithms for Garden.
//!
//! This crate provides a generic directed graph of string node IDs with
//! "depends-on" edges, used both by config-level validators (action
//! dependency checks) and by the task solver.
//!
//! # Key Types
//!
//! - [`DependencyGraph`]: node/edge registration, ordering queries and cycle detection
//! - [`DependencyEdge`]: a `{from, to}` pair consumed by [`detect_cycles`]
//! - [`GraphOptions`]: whether ordering queries tolerate cycles
//!
//! # Example
//!
//! ```
//! use garden_graph::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_dependency("deploy.api", "build.api");
//! graph.add_dependency("test.api", "deploy.api");
//!
//! let order = graph.overall_order().unwrap();
//! assert_eq!(order, vec!["build.api", "deploy.api", "test.api"]);
//! assert!(graph.detect_circular_dependencies().is_empty());
//! ```

mod cycles;
mod error;
mod graph;
mod traversal;
mod validation;

pub use cycles::{Cycle, DependencyEdge, detect_cycles, format_cycle};
pub use error::{Error, Result};
pub use graph::{DependencyGraph, GraphOptions};
pub use validation::ValidationResult;

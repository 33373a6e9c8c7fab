//! Dependency graph storage using petgraph.
//!
//! Node IDs are interned into petgraph's index arena; an edge `from -> to`
//! records that `from` depends on `to`.

use crate::cycles::DependencyEdge;
use crate::{Error, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use tracing::debug;

/// Options controlling how ordering queries treat cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphOptions {
    /// When set, ordering queries return a best-effort order instead of
    /// failing on cycles.
    pub allow_cycles: bool,
}

/// A directed graph of string node IDs with "depends-on" edges.
///
/// Cycles are allowed on insert; use [`DependencyGraph::detect_circular_dependencies`]
/// to find them, or [`DependencyGraph::overall_order`] to fail on them.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    name_to_node: HashMap<String, NodeIndex>,
    options: GraphOptions,
}

impl DependencyGraph {
    /// Create an empty graph that rejects cycles when ordering.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with the given options.
    #[must_use]
    pub fn with_options(options: GraphOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// The options this graph was created with.
    #[must_use]
    pub fn options(&self) -> GraphOptions {
        self.options
    }

    /// Register a node. Adding an existing node is a no-op.
    pub fn add_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&node) = self.name_to_node.get(id) {
            return node;
        }

        let node = self.graph.add_node(id.to_string());
        self.name_to_node.insert(id.to_string(), node);
        debug!(node = %id, "Added graph node");
        node
    }

    /// Record that `from` depends on `to`, registering both nodes if needed.
    ///
    /// Returns `false` if the edge already existed.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> bool {
        let from_index = self.add_node(from);
        let to_index = self.add_node(to);

        if self.graph.contains_edge(from_index, to_index) {
            return false;
        }

        self.graph.add_edge(from_index, to_index, ());
        debug!(from = %from, to = %to, "Added graph dependency");
        true
    }

    /// Check whether a node has been registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.name_to_node.contains_key(id)
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All node IDs in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|idx| self.graph[idx].as_str())
    }

    /// All edges, grouped by dependant in node insertion order and then by
    /// edge insertion order.
    #[must_use]
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.graph
            .node_indices()
            .flat_map(|from| {
                self.dependency_indices(from)
                    .into_iter()
                    .map(move |to| DependencyEdge::new(&self.graph[from], &self.graph[to]))
            })
            .collect()
    }

    /// Direct dependencies of a node, in the order they were added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if the node does not exist.
    pub fn direct_dependencies_of(&self, id: &str) -> Result<Vec<&str>> {
        let index = self.index_of(id)?;
        Ok(self
            .dependency_indices(index)
            .into_iter()
            .map(|idx| self.graph[idx].as_str())
            .collect())
    }

    /// Nodes that directly depend on the given node, in the order the edges
    /// were added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if the node does not exist.
    pub fn direct_dependants_of(&self, id: &str) -> Result<Vec<&str>> {
        let index = self.index_of(id)?;
        Ok(self
            .neighbour_indices(index, Direction::Incoming)
            .into_iter()
            .map(|idx| self.graph[idx].as_str())
            .collect())
    }

    /// Nodes that nothing depends on, in insertion order.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].as_str())
            .collect()
    }

    /// Check whether the graph contains any cycle, including self-loops.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Whether `from` depends on `to`, directly or transitively. A node
    /// reaches itself. Unknown nodes depend on nothing.
    ///
    /// Only the part of the graph reachable from `from` is walked, so this is
    /// the cheap way to ask whether a new edge `to -> from` would close a loop.
    #[must_use]
    pub fn depends_on(&self, from: &str, to: &str) -> bool {
        match (self.name_to_node.get(from), self.name_to_node.get(to)) {
            (Some(&from), Some(&to)) => petgraph::algo::has_path_connecting(&self.graph, from, to, None),
            _ => false,
        }
    }

    pub(crate) fn index_of(&self, id: &str) -> Result<NodeIndex> {
        self.name_to_node
            .get(id)
            .copied()
            .ok_or_else(|| Error::NodeNotFound {
                node: id.to_string(),
            })
    }

    pub(crate) fn name_of(&self, index: usize) -> &str {
        self.graph[NodeIndex::new(index)].as_str()
    }

    /// Outgoing (dependency) neighbours in edge insertion order.
    pub(crate) fn dependency_indices(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.neighbour_indices(index, Direction::Outgoing)
    }

    fn neighbour_indices(&self, index: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.id(), other)
            })
            .collect();
        // petgraph iterates the most recently added edge first
        edges.sort_by_key(|(edge, _)| *edge);
        edges.into_iter().map(|(_, other)| other).collect()
    }

    /// Dense adjacency lists indexed by node insertion order.
    pub(crate) fn adjacency(&self, direction: Direction) -> Vec<Vec<usize>> {
        self.graph
            .node_indices()
            .map(|idx| {
                self.neighbour_indices(idx, direction)
                    .into_iter()
                    .map(NodeIndex::index)
                    .collect()
            })
            .collect()
    }
}

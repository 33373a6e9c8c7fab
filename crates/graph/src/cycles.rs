//! Elementary cycle detection.
//!
//! Cycles are enumerated with Johnson's algorithm, run iteratively so that
//! large graphs cannot exhaust the stack. Start nodes are taken in insertion
//! order and each search is confined to the start node's strongly connected
//! component among the nodes not yet used as a start, which keeps every cycle
//! reported exactly once and starting at its earliest-inserted node.

use crate::{DependencyGraph, GraphOptions};
use petgraph::Direction;

/// An ordered list of node IDs forming a loop; the last node depends on the
/// first.
pub type Cycle = Vec<String>;

/// A single "depends-on" relation: `from` depends on `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    /// The dependant.
    pub from: String,
    /// The dependency.
    pub to: String,
}

impl DependencyEdge {
    /// Create an edge recording that `from` depends on `to`.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Find all elementary cycles in a list of edges.
///
/// Nodes are ordered by first appearance in `edges`, so the output is stable
/// for a given edge list. Self-loops are reported as single-node cycles.
#[must_use]
pub fn detect_cycles(edges: &[DependencyEdge]) -> Vec<Cycle> {
    let mut graph = DependencyGraph::with_options(GraphOptions { allow_cycles: true });
    for edge in edges {
        graph.add_dependency(&edge.from, &edge.to);
    }
    graph.detect_circular_dependencies()
}

/// Render a cycle for error messages, e.g. `a <- c <- b <- a`.
#[must_use]
pub fn format_cycle(cycle: &[String]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(String::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first);
    }
    parts.join(" <- ")
}

impl DependencyGraph {
    /// Find all elementary cycles in the graph.
    ///
    /// Returns an empty list for acyclic graphs. Never fails.
    #[must_use]
    pub fn detect_circular_dependencies(&self) -> Vec<Cycle> {
        let forward = self.adjacency(Direction::Outgoing);
        let backward = self.adjacency(Direction::Incoming);
        let mut cycles = Vec::new();

        for start in 0..forward.len() {
            let component = component_of(&forward, &backward, start);
            let self_loop = forward[start].contains(&start);
            let size = component.iter().filter(|member| **member).count();
            if size < 2 && !self_loop {
                continue;
            }

            for circuit in circuits_from(&forward, start, &component) {
                cycles.push(
                    circuit
                        .into_iter()
                        .map(|idx| self.name_of(idx).to_string())
                        .collect(),
                );
            }
        }

        cycles
    }
}

/// Membership mask of the strongly connected component containing `start`,
/// restricted to nodes with an index of at least `start`.
fn component_of(forward: &[Vec<usize>], backward: &[Vec<usize>], start: usize) -> Vec<bool> {
    let reaches = reachable(forward, start);
    let reached_by = reachable(backward, start);
    reaches
        .iter()
        .zip(&reached_by)
        .map(|(a, b)| *a && *b)
        .collect()
}

fn reachable(adjacency: &[Vec<usize>], start: usize) -> Vec<bool> {
    let mut seen = vec![false; adjacency.len()];
    let mut pending = vec![start];
    seen[start] = true;

    while let Some(node) = pending.pop() {
        for &next in &adjacency[node] {
            if next >= start && !seen[next] {
                seen[next] = true;
                pending.push(next);
            }
        }
    }

    seen
}

/// Johnson's circuit search rooted at `start`, confined to `component`.
fn circuits_from(adjacency: &[Vec<usize>], start: usize, component: &[bool]) -> Vec<Vec<usize>> {
    let mut found = Vec::new();
    let mut blocked = vec![false; adjacency.len()];
    let mut block_map: Vec<Vec<usize>> = vec![Vec::new(); adjacency.len()];

    let mut path = vec![start];
    // Whether a circuit was closed through the node at the same depth.
    let mut closed = vec![false];
    // (node, index of the next neighbour to visit)
    let mut stack = vec![(start, 0_usize)];
    blocked[start] = true;

    while let Some(&(node, cursor)) = stack.last() {
        if let Some(&next) = adjacency[node].get(cursor) {
            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }
            if !component[next] {
                continue;
            }
            if next == start {
                found.push(path.clone());
                if let Some(flag) = closed.last_mut() {
                    *flag = true;
                }
            } else if !blocked[next] {
                blocked[next] = true;
                path.push(next);
                closed.push(false);
                stack.push((next, 0));
            }
            continue;
        }

        stack.pop();
        path.pop();
        if closed.pop().unwrap_or(false) {
            if let Some(flag) = closed.last_mut() {
                *flag = true;
            }
            unblock(node, &mut blocked, &mut block_map);
        } else {
            for &next in &adjacency[node] {
                if component[next] && !block_map[next].contains(&node) {
                    block_map[next].push(node);
                }
            }
        }
    }

    found
}

fn unblock(node: usize, blocked: &mut [bool], block_map: &mut [Vec<usize>]) {
    let mut pending = vec![node];
    while let Some(current) = pending.pop() {
        if blocked[current] {
            blocked[current] = false;
            pending.append(&mut block_map[current]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &str)]) -> Vec<DependencyEdge> {
        pairs
            .iter()
            .map(|(from, to)| DependencyEdge::new(*from, *to))
            .collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("b", "a");
        graph.add_dependency("c", "b");
        graph.add_dependency("c", "a");
        assert!(graph.detect_circular_dependencies().is_empty());
    }

    #[test]
    fn returns_cycle_in_traversal_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_node("b");
        graph.add_node("c");
        graph.add_dependency("b", "a");
        graph.add_dependency("c", "b");
        graph.add_dependency("a", "c");

        assert_eq!(
            graph.detect_circular_dependencies(),
            vec![strings(&["a", "c", "b"])]
        );
    }

    #[test]
    fn detects_self_loop() {
        assert_eq!(detect_cycles(&edges(&[("a", "a")])), vec![strings(&["a"])]);
    }

    #[test]
    fn preserves_dependency_order() {
        let cycles = detect_cycles(&edges(&[("foo", "bar"), ("bar", "baz"), ("baz", "foo")]));
        assert_eq!(cycles, vec![strings(&["foo", "bar", "baz"])]);
    }

    #[test]
    fn cycle_embedded_in_acyclic_graph_is_reported_alone() {
        // d depends on the a/b/c loop but is not part of it
        let cycles = detect_cycles(&edges(&[
            ("d", "a"),
            ("a", "b"),
            ("b", "c"),
            ("c", "a"),
            ("e", "d"),
        ]));
        assert_eq!(cycles, vec![strings(&["a", "b", "c"])]);
    }

    #[test]
    fn finds_every_elementary_cycle() {
        // Two loops sharing node a
        let cycles = detect_cycles(&edges(&[("a", "b"), ("b", "a"), ("a", "c"), ("c", "a")]));
        assert_eq!(cycles, vec![strings(&["a", "b"]), strings(&["a", "c"])]);
    }

    #[test]
    fn overlapping_cycles_in_one_component() {
        let cycles = detect_cycles(&edges(&[
            ("a", "b"),
            ("b", "c"),
            ("c", "a"),
            ("b", "a"),
        ]));
        assert_eq!(cycles, vec![strings(&["a", "b", "c"]), strings(&["a", "b"])]);
    }

    #[test]
    fn separate_components_each_report_their_cycle() {
        let cycles = detect_cycles(&edges(&[("x", "y"), ("y", "x"), ("p", "p")]));
        assert_eq!(cycles, vec![strings(&["x", "y"]), strings(&["p"])]);
    }

    #[test]
    fn empty_edge_list() {
        assert!(detect_cycles(&[]).is_empty());
    }

    #[test]
    fn format_cycle_closes_the_loop() {
        assert_eq!(format_cycle(&strings(&["a", "c", "b"])), "a <- c <- b <- a");
        assert_eq!(format_cycle(&[]), "");
    }
}

//! Ordering queries over a [`DependencyGraph`].
//!
//! All orders place dependencies before their dependants and break ties by
//! insertion order. Traversals are iterative depth-first searches.

use crate::{DependencyGraph, Error, Result};
use petgraph::Direction;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Walk<'a> {
    adjacency: &'a [Vec<usize>],
    marks: Vec<Mark>,
    order: Vec<usize>,
    allow_cycles: bool,
}

impl<'a> Walk<'a> {
    fn new(adjacency: &'a [Vec<usize>], allow_cycles: bool) -> Self {
        Self {
            adjacency,
            marks: vec![Mark::Unvisited; adjacency.len()],
            order: Vec::new(),
            allow_cycles,
        }
    }

    /// Post-order DFS from `root`. On a back edge in strict mode, returns the
    /// cycle found on the current path.
    fn visit(&mut self, root: usize) -> std::result::Result<(), Vec<usize>> {
        if self.marks[root] != Mark::Unvisited {
            return Ok(());
        }

        let mut stack = vec![(root, 0_usize)];
        self.marks[root] = Mark::InProgress;

        while let Some(&(node, cursor)) = stack.last() {
            if let Some(&next) = self.adjacency[node].get(cursor) {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                match self.marks[next] {
                    Mark::Unvisited => {
                        self.marks[next] = Mark::InProgress;
                        stack.push((next, 0));
                    }
                    Mark::InProgress if !self.allow_cycles => {
                        let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        return Err(stack[start..].iter().map(|(n, _)| *n).collect());
                    }
                    Mark::InProgress | Mark::Done => {}
                }
                continue;
            }

            stack.pop();
            self.marks[node] = Mark::Done;
            self.order.push(node);
        }

        Ok(())
    }
}

impl DependencyGraph {
    /// All nodes, dependencies before dependants.
    ///
    /// # Errors
    ///
    /// Unless the graph was created with `allow_cycles`, returns
    /// [`Error::CycleDetected`] listing every cycle when the graph is cyclic.
    pub fn overall_order(&self) -> Result<Vec<&str>> {
        self.order_all(false)
    }

    /// Like [`DependencyGraph::overall_order`], but only nodes without
    /// dependencies.
    ///
    /// # Errors
    ///
    /// Same as [`DependencyGraph::overall_order`].
    pub fn overall_order_leaves_only(&self) -> Result<Vec<&str>> {
        self.order_all(true)
    }

    /// Transitive dependencies of `id`, dependencies first, excluding `id`.
    ///
    /// Only cycles reachable from `id` make this fail; cycles elsewhere in the
    /// graph are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] for an unknown node, or
    /// [`Error::CycleDetected`] if a cycle is reachable from it (unless the
    /// graph allows cycles).
    pub fn dependencies_of(&self, id: &str) -> Result<Vec<&str>> {
        self.reachable_from(id, Direction::Outgoing)
    }

    /// Transitive dependants of `id`, nearest dependants last, excluding `id`.
    ///
    /// # Errors
    ///
    /// Same as [`DependencyGraph::dependencies_of`], following edges in reverse.
    pub fn dependants_of(&self, id: &str) -> Result<Vec<&str>> {
        self.reachable_from(id, Direction::Incoming)
    }

    fn order_all(&self, leaves_only: bool) -> Result<Vec<&str>> {
        let allow_cycles = self.options().allow_cycles;
        if !allow_cycles && self.has_cycles() {
            return Err(Error::CycleDetected {
                cycles: self.detect_circular_dependencies(),
            });
        }

        let adjacency = self.adjacency(Direction::Outgoing);
        let mut walk = Walk::new(&adjacency, allow_cycles);

        let entry_points: Vec<usize> = self
            .adjacency(Direction::Incoming)
            .iter()
            .enumerate()
            .filter(|(_, dependants)| dependants.is_empty())
            .map(|(idx, _)| idx)
            .collect();

        for root in entry_points.into_iter().chain(0..adjacency.len()) {
            // Strict graphs are acyclic at this point, so no back edges exist.
            let _ = walk.visit(root);
        }

        Ok(walk
            .order
            .into_iter()
            .filter(|&idx| !leaves_only || adjacency[idx].is_empty())
            .map(|idx| self.name_of(idx))
            .collect())
    }

    fn reachable_from(&self, id: &str, direction: Direction) -> Result<Vec<&str>> {
        let root = self.index_of(id)?.index();
        let adjacency = self.adjacency(direction);
        let mut walk = Walk::new(&adjacency, self.options().allow_cycles);

        walk.visit(root).map_err(|cycle| {
            let mut names: Vec<String> = cycle
                .into_iter()
                .map(|idx| self.name_of(idx).to_string())
                .collect();
            if direction == Direction::Incoming {
                names.reverse();
            }
            Error::CycleDetected {
                cycles: vec![names],
            }
        })?;

        Ok(walk
            .order
            .into_iter()
            .filter(|&idx| idx != root)
            .map(|idx| self.name_of(idx))
            .collect())
    }
}

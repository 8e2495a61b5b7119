//! Cycle detection over dependency graphs
//!
//! Depth-bounded DFS used by the registry before committing a registration,
//! and by the diagnostics layer to enumerate the cycles of a graph.

use std::collections::{BTreeSet, HashSet};
use tracing::warn;

use crate::module::id::ModuleId;
use crate::module::registry::graph::DependencyLookup;

/// Default bound on DFS depth
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Depth-bounded cycle detector
#[derive(Debug, Clone, Copy)]
pub struct CycleDetector {
    max_depth: usize,
}

impl Default for CycleDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl CycleDetector {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Would giving `id` the edges `proposed` close a cycle in `graph`?
    ///
    /// `proposed` replaces whatever edges `graph` currently holds for `id`;
    /// every other node uses its edges from `graph`. A branch deeper than
    /// `max_depth` is abandoned as "no cycle" with a warning.
    pub fn has_cycle<G: DependencyLookup>(
        &self,
        id: &ModuleId,
        proposed: &[ModuleId],
        graph: &G,
    ) -> bool {
        let mut search = Search {
            root: id,
            proposed,
            graph,
            max_depth: self.max_depth,
            path: Vec::new(),
            visited: HashSet::new(),
            overflowed: false,
        };
        let found = search.visit(id, 0);
        if search.overflowed && !found {
            warn!(
                "Cycle search from {} exceeded max depth {}; treating as acyclic",
                id, self.max_depth
            );
        }
        found
    }

    /// Every distinct cycle reachable from `roots`
    ///
    /// Each cycle is reported once, rotated so that its smallest id comes
    /// first, without repeating the closing node.
    pub fn find_cycles<'g, G, I>(&self, graph: &G, roots: I) -> Vec<Vec<ModuleId>>
    where
        G: DependencyLookup,
        I: IntoIterator<Item = &'g ModuleId>,
    {
        let mut finder = CycleFinder {
            graph,
            max_depth: self.max_depth,
            path: Vec::new(),
            visited: HashSet::new(),
            found: BTreeSet::new(),
        };
        for root in roots {
            finder.visit(root, 0);
        }
        finder.found.into_iter().collect()
    }
}

struct Search<'a, G> {
    root: &'a ModuleId,
    proposed: &'a [ModuleId],
    graph: &'a G,
    max_depth: usize,
    path: Vec<ModuleId>,
    visited: HashSet<ModuleId>,
    overflowed: bool,
}

impl<'a, G: DependencyLookup> Search<'a, G> {
    fn visit(&mut self, node: &ModuleId, depth: usize) -> bool {
        if self.path.contains(node) {
            return true;
        }
        if self.visited.contains(node) {
            return false;
        }
        if depth > self.max_depth {
            self.overflowed = true;
            return false;
        }

        let graph = self.graph;
        let edges: &[ModuleId] = if node == self.root {
            self.proposed
        } else {
            graph.dependencies_of(node).unwrap_or(&[])
        };

        self.path.push(node.clone());
        for next in edges {
            if self.visit(next, depth + 1) {
                return true;
            }
        }
        self.path.pop();
        self.visited.insert(node.clone());
        false
    }
}

struct CycleFinder<'a, G> {
    graph: &'a G,
    max_depth: usize,
    path: Vec<ModuleId>,
    visited: HashSet<ModuleId>,
    found: BTreeSet<Vec<ModuleId>>,
}

impl<'a, G: DependencyLookup> CycleFinder<'a, G> {
    fn visit(&mut self, node: &ModuleId, depth: usize) {
        if let Some(pos) = self.path.iter().position(|n| n == node) {
            self.found.insert(canonical_rotation(&self.path[pos..]));
            return;
        }
        if self.visited.contains(node) || depth > self.max_depth {
            return;
        }

        let graph = self.graph;
        self.path.push(node.clone());
        for next in graph.dependencies_of(node).unwrap_or(&[]) {
            self.visit(next, depth + 1);
        }
        self.path.pop();
        self.visited.insert(node.clone());
    }
}

fn canonical_rotation(cycle: &[ModuleId]) -> Vec<ModuleId> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[start..].iter().chain(&cycle[..start]).cloned().collect()
}

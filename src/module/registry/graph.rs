//! Declared dependency graph
//!
//! The registry's view of the module graph: nodes are module ids, edges are
//! the dependency lists declared at registration time. The loader keeps a
//! separate graph of locator pre-registrations (`FetchPlan`); both expose
//! their edges through [`DependencyLookup`] so the same graph walks run over
//! either.

use std::collections::{BTreeSet, HashMap};

use crate::module::id::ModuleId;

/// Read-only edge lookup shared by the registry's and the loader's graphs
pub trait DependencyLookup {
    /// Declared dependencies of `id`, or `None` if the graph has no node for it
    fn dependencies_of(&self, id: &ModuleId) -> Option<&[ModuleId]>;

    /// Whether the graph has a node for `id`
    fn contains(&self, id: &ModuleId) -> bool {
        self.dependencies_of(id).is_some()
    }
}

/// Dependency edges declared by registered modules
#[derive(Debug, Default, Clone)]
pub struct DeclaredDependencyGraph {
    edges: HashMap<ModuleId, Vec<ModuleId>>,
}

impl DeclaredDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the edge list of `id`
    pub fn set_dependencies(&mut self, id: ModuleId, dependencies: Vec<ModuleId>) {
        self.edges.insert(id, dependencies);
    }

    /// Every node that lists `id` as a dependency, in id order
    pub fn dependents_of(&self, id: &ModuleId) -> Vec<ModuleId> {
        let dependents: BTreeSet<&ModuleId> = self
            .edges
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(node, _)| node)
            .collect();
        dependents.into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl DependencyLookup for DeclaredDependencyGraph {
    fn dependencies_of(&self, id: &ModuleId) -> Option<&[ModuleId]> {
        self.edges.get(id).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModuleId {
        ModuleId::parse(s).unwrap()
    }

    #[test]
    fn test_dependents() {
        let mut graph = DeclaredDependencyGraph::new();
        graph.set_dependencies(id("core.a"), vec![]);
        graph.set_dependencies(id("core.b"), vec![id("core.a"), id("ext.x")]);
        graph.set_dependencies(id("core.c"), vec![id("core.a")]);

        assert_eq!(graph.dependents_of(&id("core.a")), vec![id("core.b"), id("core.c")]);
        assert!(graph.dependents_of(&id("core.c")).is_empty());
        assert!(graph.contains(&id("core.b")));
        assert!(!graph.contains(&id("ext.x")));
    }
}

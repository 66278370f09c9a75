//! # Dependency graph and load-order resolution.
//!
//! Declared edges are `name → [dependencies]`. [`DependencyGraph::resolve`] turns a
//! set of requested roots into a load order where every dependency precedes its
//! dependents.
//!
//! ## Algorithm
//! ```text
//! for root in roots:
//!   visit(root):
//!     visited?  → return
//!     visiting? → CycleDependency(path from first occurrence .. root again)
//!     mark visiting, push on path
//!     for dep in deps(root): visit(dep)
//!     unmark, mark visited, append to order (post-order)
//! ```
//!
//! ## Rules
//! - A cycle anywhere under the requested roots fails the whole resolution.
//! - Each name appears in the output exactly once.
//! - Names without declared dependencies are leaves; unknown names are not an error here.

use std::collections::{HashMap, HashSet};

use crate::error::LoaderError;

/// Declared dependency edges between capability names.
#[derive(Debug, Default, Clone)]
pub(crate) struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Replaces the dependency list of `name`. An empty list removes the entry.
    pub(crate) fn set(&mut self, name: &str, deps: Vec<String>) {
        if deps.is_empty() {
            self.edges.remove(name);
        } else {
            self.edges.insert(name.to_string(), deps);
        }
    }

    /// Declared dependencies of `name` (empty if none).
    pub(crate) fn dependencies(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolves `roots` into a dependency-first load order.
    pub(crate) fn resolve<'a, I>(&self, roots: I) -> Result<Vec<String>, LoaderError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut walk = Walk {
            graph: self,
            path: Vec::new(),
            visited: HashSet::new(),
            order: Vec::new(),
        };
        for root in roots {
            walk.visit(root)?;
        }
        Ok(walk.order)
    }
}

struct Walk<'g> {
    graph: &'g DependencyGraph,
    /// Names currently being visited, outermost first.
    path: Vec<String>,
    visited: HashSet<String>,
    order: Vec<String>,
}

impl Walk<'_> {
    fn visit(&mut self, name: &str) -> Result<(), LoaderError> {
        if self.visited.contains(name) {
            return Ok(());
        }
        if let Some(pos) = self.path.iter().position(|n| n == name) {
            let mut cycle = self.path[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(LoaderError::CycleDependency { cycle });
        }

        self.path.push(name.to_string());
        let graph = self.graph;
        for dep in graph.dependencies(name) {
            self.visit(dep)?;
        }
        self.path.pop();

        self.visited.insert(name.to_string());
        self.order.push(name.to_string());
        Ok(())
    }
}

//! Dependency graph and transitive closure
//!
//! Edges are by package name only. Version constraints in dependency
//! specifiers are discarded, so every version and build of a package
//! contributes to the same node.

use std::collections::HashMap;

use crate::models::{NameSet, Repodata};

/// Extract the package name from a dependency specifier
///
/// The name is everything before the first space or comparison character:
/// `"python >=3.9"` and `"openssl>=3"` both yield the package name.
pub fn dependency_name(spec: &str) -> &str {
    let spec = spec.trim_start();
    match spec.find([' ', '<', '>', '=']) {
        Some(end) => &spec[..end],
        None => spec,
    }
}

/// Package name to the names it depends on
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<String, NameSet>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from several catalogs
    pub fn from_repodata<'a>(catalogs: impl IntoIterator<Item = &'a Repodata>) -> Self {
        let mut graph = Self::new();
        for repodata in catalogs {
            graph.add_repodata(repodata);
        }
        graph
    }

    /// Add every record of both collections
    ///
    /// Each record gets a node even when it has no dependencies.
    pub fn add_repodata(&mut self, repodata: &Repodata) {
        for (_, _, record) in repodata.iter_records() {
            let deps = self.edges.entry(record.name.clone()).or_default();
            for spec in record.depends.iter().flatten() {
                let name = dependency_name(spec);
                if !name.is_empty() {
                    deps.insert(name);
                }
            }
        }
    }

    /// Record that `name` depends on `dependency`
    pub fn add_edge(&mut self, name: &str, dependency: &str) {
        self.edges
            .entry(name.to_string())
            .or_default()
            .insert(dependency);
    }

    /// Direct dependencies of `name`, if it has a node
    pub fn dependencies(&self, name: &str) -> Option<&NameSet> {
        self.edges.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Every name reachable from `seed`, seed included
    ///
    /// Names without a node are kept as leaves. Each name is expanded at
    /// most once, so cycles terminate.
    pub fn closure(&self, seed: &NameSet) -> NameSet {
        let mut pending = seed.clone();
        let mut done = NameSet::new();
        let mut result = NameSet::new();

        while let Some(name) = pending.pop() {
            if done.contains(&name) {
                continue;
            }
            result.insert(name.as_str());
            if let Some(deps) = self.edges.get(&name) {
                for dep in deps {
                    result.insert(dep.as_str());
                    if !done.contains(dep) {
                        pending.insert(dep.as_str());
                    }
                }
            }
            done.insert(name);
        }

        result
    }
}

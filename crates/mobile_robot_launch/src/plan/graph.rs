//! Dependency graph construction and topological sorting

use crate::plan::descriptor::{DependencyCondition, LaunchDescriptor};
use std::collections::{BTreeSet, HashMap};

/// Dependency graph over a list of descriptors.
///
/// Indices refer to positions in the declared list; the execution order is a
/// topological order where independent descriptors keep their declared order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    /// Direct dependencies per descriptor, as (index, condition)
    edges: Vec<Vec<(usize, DependencyCondition)>>,
    /// Descriptor indices in execution order
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Build the graph for `descriptors`
    pub fn build(descriptors: &[LaunchDescriptor]) -> Result<Self, GraphError> {
        let mut index_map: HashMap<&str, usize> = HashMap::new();
        for (i, descriptor) in descriptors.iter().enumerate() {
            if index_map.insert(descriptor.name.as_str(), i).is_some() {
                return Err(GraphError::DuplicateName(descriptor.name.clone()));
            }
        }

        let mut edges = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let mut deps = Vec::with_capacity(descriptor.depends_on.len());
            for dep in &descriptor.depends_on {
                let index = index_map.get(dep.target.as_str()).copied().ok_or_else(|| {
                    GraphError::UnknownDependency {
                        node: descriptor.name.clone(),
                        dependency: dep.target.clone(),
                    }
                })?;
                deps.push((index, dep.condition));
            }
            edges.push(deps);
        }

        let names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        let order = Self::topological_sort(&names, &edges)?;

        Ok(Self {
            names,
            edges,
            order,
        })
    }

    /// Topological sort using Kahn's algorithm, lowest declared index first
    fn topological_sort(
        names: &[String],
        edges: &[Vec<(usize, DependencyCondition)>],
    ) -> Result<Vec<usize>, GraphError> {
        let mut in_degree = vec![0usize; names.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); names.len()];

        for (node, deps) in edges.iter().enumerate() {
            for &(dep, _) in deps {
                in_degree[node] += 1;
                dependents[dep].push(node);
            }
        }

        // Start with nodes that have no dependencies
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut sorted = Vec::with_capacity(names.len());

        while let Some(node) = ready.pop_first() {
            sorted.push(node);

            for &dependent in &dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if sorted.len() != names.len() {
            let cycle_nodes = (0..names.len())
                .filter(|i| !sorted.contains(i))
                .map(|i| names[i].clone())
                .collect();
            return Err(GraphError::CyclicDependency(cycle_nodes));
        }

        Ok(sorted)
    }

    /// Descriptor indices in execution order
    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    /// Descriptor names in execution order
    pub fn launch_order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|&i| self.names[i].as_str())
    }

    /// Reverse of the launch order
    pub fn shutdown_order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().rev().map(|&i| self.names[i].as_str())
    }

    /// Direct dependencies of `name`
    pub fn dependencies(&self, name: &str) -> Vec<(&str, DependencyCondition)> {
        self.index_of(name)
            .map(|i| {
                self.edges[i]
                    .iter()
                    .map(|&(dep, condition)| (self.names[dep].as_str(), condition))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Descriptors that depend directly on `name`
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        let Some(target) = self.index_of(name) else {
            return Vec::new();
        };
        self.order
            .iter()
            .filter(|&&i| self.edges[i].iter().any(|&(dep, _)| dep == target))
            .map(|&i| self.names[i].as_str())
            .collect()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Errors that can occur when building the dependency graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Descriptor '{node}' depends on unknown descriptor '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("Cyclic dependency detected involving descriptors: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Duplicate descriptor name '{0}'")]
    DuplicateName(String),
}

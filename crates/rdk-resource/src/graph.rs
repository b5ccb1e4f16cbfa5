//! [`DependencyGraph`] – construction order over resource names.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rdk_types::{RdkError, ResourceName};

/// Directed graph where an edge `a → b` means "`a` depends on `b`".
///
/// Iteration is over ordered maps so that the construction order is stable
/// for a given configuration.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    deps: BTreeMap<ResourceName, BTreeSet<ResourceName>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: ResourceName) {
        self.deps.entry(name).or_default();
    }

    /// Record that `dependent` needs `dependency` built first.
    pub fn add_edge(&mut self, dependent: ResourceName, dependency: ResourceName) {
        self.deps.entry(dependency.clone()).or_default();
        self.deps.entry(dependent).or_default().insert(dependency);
    }

    pub fn contains(&self, name: &ResourceName) -> bool {
        self.deps.contains_key(name)
    }

    pub fn dependencies_of(&self, name: &ResourceName) -> impl Iterator<Item = &ResourceName> {
        self.deps.get(name).into_iter().flatten()
    }

    /// Every node that depends on `name`, directly or transitively.
    pub fn dependents_of(&self, name: &ResourceName) -> BTreeSet<ResourceName> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([name.clone()]);
        while let Some(current) = queue.pop_front() {
            for (node, deps) in &self.deps {
                if deps.contains(&current) && found.insert(node.clone()) {
                    queue.push_back(node.clone());
                }
            }
        }
        found
    }

    /// Dependencies-first ordering of every node.
    ///
    /// # Errors
    ///
    /// [`RdkError::DependencyCycle`] naming one cycle when the graph is not
    /// acyclic.
    pub fn topological_order(&self) -> Result<Vec<ResourceName>, RdkError> {
        let mut remaining: BTreeMap<&ResourceName, usize> =
            self.deps.iter().map(|(n, d)| (n, d.len())).collect();
        let mut ready: VecDeque<&ResourceName> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(self.deps.len());

        while let Some(node) = ready.pop_front() {
            order.push(node.clone());
            remaining.remove(node);
            for (dependent, deps) in &self.deps {
                if !deps.contains(node) {
                    continue;
                }
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() == self.deps.len() {
            return Ok(order);
        }
        let stuck: BTreeSet<&ResourceName> = remaining.keys().copied().collect();
        Err(RdkError::DependencyCycle(self.find_cycle(&stuck)))
    }

    /// Walk dependency edges inside `stuck` until a node repeats.
    fn find_cycle(&self, stuck: &BTreeSet<&ResourceName>) -> Vec<String> {
        let Some(&start) = stuck.iter().next() else {
            return Vec::new();
        };
        let mut path: Vec<&ResourceName> = vec![start];
        let mut current = start;
        loop {
            let next = self
                .dependencies_of(current)
                .find(|d| stuck.contains(d));
            let Some(next) = next else {
                break;
            };
            if let Some(pos) = path.iter().position(|n| *n == next) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|n| n.to_string()).collect();
                cycle.push(next.to_string());
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.iter().map(|n| n.to_string()).collect()
    }
}

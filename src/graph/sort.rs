use crate::error::{DeployError, DeployResult};
use std::collections::{HashMap, HashSet, VecDeque};

/// Pipelines in scope together with the names each one references
///
/// Order matters: it seeds the ready queue, so independent pipelines come out
/// in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    references: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pipeline and the pipelines it references (referenced -> referrer edges)
    pub fn add(&mut self, name: impl Into<String>, references: Vec<String>) {
        let name = name.into();
        if !self.references.contains_key(&name) {
            self.nodes.push(name.clone());
        }
        let mut unique = Vec::new();
        for reference in references {
            if !unique.contains(&reference) {
                unique.push(reference);
            }
        }
        self.references.insert(name, unique);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kahn's algorithm: every referenced pipeline precedes its referrers
    ///
    /// Names that only appear as edge targets are back-filled as nodes.
    pub fn topological_order(&self) -> DeployResult<Vec<String>> {
        let mut nodes: Vec<&str> = self.nodes.iter().map(String::as_str).collect();
        let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (*n, 0)).collect();
        let mut reverse_graph: HashMap<&str, Vec<&str>> = HashMap::new();

        for node in &self.nodes {
            for dep in &self.references[node] {
                if !in_degree.contains_key(dep.as_str()) {
                    in_degree.insert(dep.as_str(), 0);
                    nodes.push(dep.as_str());
                }
                reverse_graph
                    .entry(dep.as_str())
                    .or_default()
                    .push(node.as_str());
                *in_degree.entry(node.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&str> = nodes
            .iter()
            .copied()
            .filter(|n| in_degree[n] == 0)
            .collect();

        let mut result = Vec::with_capacity(nodes.len());
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());

            if let Some(dependents) = reverse_graph.get(node) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if result.len() < nodes.len() {
            let emitted: HashSet<&str> = result.iter().map(String::as_str).collect();
            let remaining = nodes
                .into_iter()
                .filter(|n| !emitted.contains(n))
                .map(str::to_string)
                .collect();
            return Err(DeployError::CycleDetected { remaining });
        }

        Ok(result)
    }

    /// Deletion order for the pipelines in `removal`: referrers go first
    pub fn teardown_order(&self, removal: &HashSet<String>) -> DeployResult<Vec<String>> {
        let mut order = self.topological_order()?;
        order.retain(|name| removal.contains(name));
        order.reverse();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_linear_chain() {
        let mut graph = DependencyGraph::new();
        graph.add("Parent", refs(&["Child"]));
        graph.add("Child", vec![]);

        assert_eq!(graph.topological_order().unwrap(), refs(&["Child", "Parent"]));
    }

    #[test]
    fn test_diamond_respects_every_edge() {
        let mut graph = DependencyGraph::new();
        graph.add("App", refs(&["Left", "Right"]));
        graph.add("Left", refs(&["Base"]));
        graph.add("Right", refs(&["Base"]));
        graph.add("Base", vec![]);

        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 4);
        for (referrer, referenced) in [("App", "Left"), ("App", "Right"), ("Left", "Base"), ("Right", "Base")] {
            assert!(position(&order, referenced) < position(&order, referrer));
        }
    }

    #[test]
    fn test_independent_nodes_keep_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add("C", vec![]);
        graph.add("A", vec![]);
        graph.add("B", vec![]);

        assert_eq!(graph.topological_order().unwrap(), refs(&["C", "A", "B"]));
    }

    #[test]
    fn test_duplicate_references_counted_once() {
        let mut graph = DependencyGraph::new();
        graph.add("Parent", refs(&["Child", "Child"]));
        graph.add("Child", vec![]);

        assert_eq!(graph.topological_order().unwrap(), refs(&["Child", "Parent"]));
    }

    #[test]
    fn test_two_node_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add("A", refs(&["B"]));
        graph.add("B", refs(&["A"]));
        graph.add("Free", vec![]);

        match graph.topological_order() {
            Err(DeployError::CycleDetected { remaining }) => {
                assert_eq!(remaining, refs(&["A", "B"]));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add("Loop", refs(&["Loop"]));
        assert!(matches!(
            graph.topological_order(),
            Err(DeployError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_targets_back_filled() {
        let mut graph = DependencyGraph::new();
        graph.add("Parent", refs(&["Outside"]));

        assert_eq!(graph.topological_order().unwrap(), refs(&["Outside", "Parent"]));
    }

    #[test]
    fn test_teardown_reverses_and_filters() {
        let mut graph = DependencyGraph::new();
        graph.add("Child", vec![]);
        graph.add("Parent", refs(&["Child"]));
        graph.add("Keep", refs(&["Child"]));

        let removal: HashSet<String> = ["Child", "Parent"].iter().map(|s| s.to_string()).collect();
        assert_eq!(graph.teardown_order(&removal).unwrap(), refs(&["Parent", "Child"]));
    }
}

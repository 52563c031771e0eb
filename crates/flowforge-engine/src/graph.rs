//! Directed dependency graph with iterative cycle detection.
//!
//! Traversal uses an explicit stack rather than recursion so large graphs
//! cannot exhaust call depth. A self-loop is a one-node cycle.

use flowforge_core::ForgeId;
use std::collections::{HashMap, HashSet, VecDeque};

/// Adjacency view of a set of dependency edges (source → targets).
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    adjacency: HashMap<ForgeId, Vec<ForgeId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from (source, target) pairs.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (ForgeId, ForgeId)>,
    {
        let mut graph = Self::new();
        for (source, target) in edges {
            graph.add_edge(source, target);
        }
        graph
    }

    /// Add one directed edge.
    pub fn add_edge(&mut self, source: ForgeId, target: ForgeId) {
        self.adjacency.entry(source).or_default().push(target);
    }

    /// Depth-first search from `start`; returns the node sequence of a cycle
    /// if the traversal re-enters a node already on the current path.
    pub fn find_cycle_from(&self, start: ForgeId) -> Option<Vec<ForgeId>> {
        self.cycle_from(start, &mut HashSet::new())
    }

    /// Check every source node. A new edge can close a cycle reachable only
    /// through pre-existing edges from another start point, so each source
    /// gets its own traversal (completed nodes are shared across them).
    pub fn first_cycle(&self) -> Option<Vec<ForgeId>> {
        let mut done = HashSet::new();
        let sources: Vec<ForgeId> = self.adjacency.keys().copied().collect();
        for source in sources {
            if let Some(cycle) = self.cycle_from(source, &mut done) {
                return Some(cycle);
            }
        }
        None
    }

    fn cycle_from(&self, start: ForgeId, done: &mut HashSet<ForgeId>) -> Option<Vec<ForgeId>> {
        if done.contains(&start) {
            return None;
        }
        let mut on_path = HashSet::new();
        let mut path = Vec::new();
        let mut stack: Vec<(ForgeId, usize)> = vec![(start, 0)];
        on_path.insert(start);
        path.push(start);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let index = frame.1;
            let neighbors = self
                .adjacency
                .get(&node)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if index < neighbors.len() {
                frame.1 += 1;
                let next = neighbors[index];
                if on_path.contains(&next) {
                    let pos = path.iter().position(|n| *n == next).unwrap_or(0);
                    return Some(path[pos..].to_vec());
                }
                if !done.contains(&next) {
                    on_path.insert(next);
                    path.push(next);
                    stack.push((next, 0));
                }
            } else {
                stack.pop();
                on_path.remove(&node);
                path.pop();
                done.insert(node);
            }
        }
        None
    }

    /// Breadth-first reachability from `from` to `to`.
    pub fn has_path(&self, from: ForgeId, to: ForgeId) -> bool {
        if from == to {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([from]);
        visited.insert(from);
        while let Some(node) = queue.pop_front() {
            for &next in self.adjacency.get(&node).into_iter().flatten() {
                if next == to {
                    return true;
                }
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<ForgeId> {
        (0..n).map(|_| ForgeId::new()).collect()
    }

    #[test]
    fn test_empty_graph_has_no_cycle() {
        assert!(DependencyGraph::new().first_cycle().is_none());
    }

    #[test]
    fn test_chain_is_acyclic() {
        let n = ids(4);
        let graph =
            DependencyGraph::from_edges([(n[0], n[1]), (n[1], n[2]), (n[2], n[3])]);
        assert!(graph.first_cycle().is_none());
        assert!(graph.has_path(n[0], n[3]));
        assert!(!graph.has_path(n[3], n[0]));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let n = ids(4);
        let graph = DependencyGraph::from_edges([
            (n[0], n[1]),
            (n[0], n[2]),
            (n[1], n[3]),
            (n[2], n[3]),
        ]);
        assert!(graph.first_cycle().is_none());
    }

    #[test]
    fn test_self_loop_is_one_node_cycle() {
        let n = ids(1);
        let graph = DependencyGraph::from_edges([(n[0], n[0])]);
        assert_eq!(graph.first_cycle(), Some(vec![n[0]]));
    }

    #[test]
    fn test_two_node_cycle() {
        let n = ids(2);
        let graph = DependencyGraph::from_edges([(n[0], n[1]), (n[1], n[0])]);
        let cycle = graph.find_cycle_from(n[0]).unwrap();
        assert_eq!(cycle.len(), 2);
        assert!(cycle.contains(&n[0]) && cycle.contains(&n[1]));
    }

    #[test]
    fn test_cycle_reached_through_preexisting_edges() {
        // a -> b -> c -> a only closes when checked from a start that can
        // reach it; first_cycle must find it regardless of key order.
        let n = ids(4);
        let graph = DependencyGraph::from_edges([
            (n[3], n[0]),
            (n[0], n[1]),
            (n[1], n[2]),
            (n[2], n[0]),
        ]);
        let cycle = graph.first_cycle().unwrap();
        assert_eq!(cycle.len(), 3);
        assert!(!cycle.contains(&n[3]));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let n = ids(10_000);
        let mut graph = DependencyGraph::new();
        for pair in n.windows(2) {
            graph.add_edge(pair[0], pair[1]);
        }
        assert!(graph.first_cycle().is_none());
        graph.add_edge(n[n.len() - 1], n[0]);
        assert!(graph.first_cycle().is_some());
    }
}

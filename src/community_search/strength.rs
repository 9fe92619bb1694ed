use std::collections::{HashMap, HashSet};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::graph::WeightedGraph;
use crate::types::VInt;

/// How the two normalised overlap ratios of an edge are combined.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrengthMode {
    /// `s1 + s2 - 1`, in `[-1, 1]`. Negative values mark discordant edges.
    #[default]
    #[display(fmt = "difference")]
    Difference,
    /// `(s1 + s2) / 2`, in `[0, 1]`.
    #[display(fmt = "average")]
    Average,
}

impl StrengthMode {
    pub fn combine(self, s1: f64, s2: f64) -> f64 {
        match self {
            StrengthMode::Difference => s1 + s2 - 1.0,
            StrengthMode::Average => (s1 + s2) / 2.0,
        }
    }
}

/// Graph-wide common-neighbor bookkeeping behind edge strengths.
///
/// Counts are cached per pair on both endpoints, so each pair is intersected
/// once. The per-node maximum only grows as more incident pairs are seen.
#[derive(Debug, Clone, Default)]
pub struct StrengthIndex {
    mode: StrengthMode,
    common_neighbors: HashMap<VInt, HashMap<VInt, usize>>,
    max_common_neighbors: HashMap<VInt, usize>,
    finalized: HashSet<VInt>,
}

impl StrengthIndex {
    pub fn new(mode: StrengthMode) -> Self {
        StrengthIndex {
            mode,
            ..Default::default()
        }
    }

    pub fn mode(&self) -> StrengthMode {
        self.mode
    }

    pub fn is_finalized(&self, node: VInt) -> bool {
        self.finalized.contains(&node)
    }

    pub fn finalized_count(&self) -> usize {
        self.finalized.len()
    }

    /// Number of directed `(node, neighbor)` entries cached so far.
    pub fn cached_pair_count(&self) -> usize {
        self.common_neighbors.values().map(HashMap::len).sum()
    }

    pub fn common_neighbor_count(&self, u: VInt, v: VInt) -> Option<usize> {
        self.common_neighbors.get(&u).and_then(|row| row.get(&v)).copied()
    }

    pub fn max_common_neighbor_count(&self, node: VInt) -> usize {
        self.max_common_neighbors.get(&node).copied().unwrap_or(0)
    }

    /// Compute and store the strength of every edge incident to `node`.
    /// Runs once per node; later calls are no-ops.
    pub fn assign_local_strength(&mut self, graph: &mut WeightedGraph, node: VInt) {
        if self.finalized.contains(&node) || !graph.contains_node(node) {
            return;
        }
        let neighbors: Vec<VInt> = graph.neighbors(node).collect();
        self.update_common_neighbors(graph, node, &neighbors);

        let max_mutual_node = self.max_common_neighbor_count(node);
        for neighbor in neighbors {
            let max_mutual_neighbor = self.max_common_neighbor_count(neighbor);
            let shared = self.common_neighbor_count(node, neighbor).unwrap_or(0) as f64;

            let s1 = if max_mutual_node != 0 {
                shared / max_mutual_node as f64
            } else {
                0.0
            };
            let s2 = if max_mutual_neighbor != 0 {
                shared / max_mutual_neighbor as f64
            } else {
                0.0
            };
            graph.assign_strength(node, neighbor, self.mode.combine(s1, s2));
        }
        self.finalized.insert(node);
    }

    fn update_common_neighbors(&mut self, graph: &WeightedGraph, node: VInt, neighbors: &[VInt]) {
        self.common_neighbors.entry(node).or_default();
        self.max_common_neighbors.entry(node).or_insert(0);

        for &neighbor in neighbors {
            if self.common_neighbor_count(node, neighbor).is_some() {
                continue;
            }
            let shared = graph.common_neighbors(node, neighbor).len();
            self.common_neighbors.entry(node).or_default().insert(neighbor, shared);
            self.common_neighbors.entry(neighbor).or_default().insert(node, shared);

            for endpoint in [node, neighbor] {
                let max = self.max_common_neighbors.entry(endpoint).or_insert(0);
                if shared > *max {
                    *max = shared;
                }
            }
        }
    }
}

#[cfg(test)]
mod test_strength {
    use crate::community_search::strength::{StrengthIndex, StrengthMode};
    use crate::graph::WeightedGraph;

    #[test]
    fn test_combine() {
        assert_eq!(StrengthMode::Difference.combine(1.0, 0.5), 0.5);
        assert_eq!(StrengthMode::Average.combine(1.0, 0.5), 0.75);
        assert_eq!(StrengthMode::Difference.combine(0.0, 0.0), -1.0);
        assert_eq!(StrengthMode::Average.to_string(), "average");
    }

    #[test]
    fn test_triangle_strengths_are_uniform() {
        let mut g = WeightedGraph::from_edges(vec![(1, 2), (1, 3), (2, 3), (3, 4)]);
        let mut index = StrengthIndex::new(StrengthMode::Difference);
        for node in [1, 2, 3] {
            index.assign_local_strength(&mut g, node);
        }
        assert_eq!(g.strength(1, 2), 1.0);
        assert_eq!(g.strength(2, 1), 1.0);
        assert_eq!(g.strength(1, 3), 1.0);
        assert_eq!(g.strength(2, 3), 1.0);
        // 3-4 shares nothing: 0 / 1 + 0 / 0 - 1.
        assert_eq!(g.strength(3, 4), -1.0);
        assert_eq!(g.strength(4, 3), -1.0);

        assert_eq!(index.common_neighbor_count(1, 2), Some(1));
        assert_eq!(index.common_neighbor_count(4, 3), Some(0));
        assert_eq!(index.max_common_neighbor_count(3), 1);
        assert_eq!(index.max_common_neighbor_count(4), 0);
        assert_eq!(index.finalized_count(), 3);
    }

    #[test]
    fn test_assignment_runs_once() {
        let mut g = WeightedGraph::from_edges(vec![(1, 2), (2, 3), (1, 3)]);
        let mut index = StrengthIndex::new(StrengthMode::Average);
        index.assign_local_strength(&mut g, 1);
        let cached = index.cached_pair_count();
        assert_eq!(cached, 4);
        assert!(index.is_finalized(1));

        // A later edge is not seen through the finalized node.
        g.add_edge(1, 9);
        index.assign_local_strength(&mut g, 1);
        assert_eq!(index.cached_pair_count(), cached);
        assert_eq!(g.strength(1, 9), 0.0);

        // Unknown nodes are ignored.
        index.assign_local_strength(&mut g, 42);
        assert!(!index.is_finalized(42));
    }

    #[test]
    fn test_average_mode_bounds() {
        let mut g = WeightedGraph::from_edges(vec![(1, 2), (1, 3), (2, 3), (3, 4), (4, 5), (3, 5)]);
        let mut index = StrengthIndex::new(StrengthMode::Average);
        for node in g.node_ids().collect::<Vec<_>>() {
            index.assign_local_strength(&mut g, node);
        }
        for edge in g.edges() {
            let s = g.strength(edge.u, edge.v);
            assert!((0.0..=1.0).contains(&s), "strength {} out of range", s);
            assert_eq!(s, g.strength(edge.v, edge.u));
        }
    }
}

use std::collections::{BTreeMap, HashMap};

use crate::types::{VInt, DEFAULT_WEIGHT};

/// One vertex of a [`WeightedGraph`](crate::graph::WeightedGraph).
///
/// The adjacency map holds neighbor id -> edge weight. The strength map is a
/// lazily filled cache of the structural strength of each incident edge; it is
/// written by the community search engine and may lag behind the adjacency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphNode {
    id: VInt,
    adjacency: BTreeMap<VInt, f64>,
    strengths: HashMap<VInt, f64>,
}

impl GraphNode {
    pub fn new(id: VInt) -> Self {
        GraphNode {
            id,
            ..Default::default()
        }
    }

    pub fn id(&self) -> VInt {
        self.id
    }

    /// Neighbor id -> weight, ascending by id.
    pub fn neighbors(&self) -> &BTreeMap<VInt, f64> {
        &self.adjacency
    }

    pub fn neighbor_ids(&self) -> impl Iterator<Item = VInt> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn neighbor_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn add_connection(&mut self, neighbor: VInt, weight: f64) {
        // Overwrite, edges form a map rather than a multiset.
        self.adjacency.insert(neighbor, weight);
    }

    pub fn add_unweighted_connection(&mut self, neighbor: VInt) {
        self.add_connection(neighbor, DEFAULT_WEIGHT);
    }

    pub fn remove_neighbor(&mut self, neighbor: VInt) -> Option<f64> {
        self.adjacency.remove(&neighbor)
    }

    pub fn has_edge(&self, neighbor: VInt) -> bool {
        self.adjacency.contains_key(&neighbor)
    }

    pub fn has_self_loop(&self) -> bool {
        self.has_edge(self.id)
    }

    /// Weight of the edge to `neighbor`, 0.0 when there is none.
    pub fn edge_weight(&self, neighbor: VInt) -> f64 {
        self.adjacency.get(&neighbor).copied().unwrap_or(0.0)
    }

    pub fn assign_strength(&mut self, neighbor: VInt, strength: f64) {
        self.strengths.insert(neighbor, strength);
    }

    /// Cached strength of the edge to `neighbor`, 0.0 when not computed yet.
    pub fn strength(&self, neighbor: VInt) -> f64 {
        self.strengths.get(&neighbor).copied().unwrap_or(0.0)
    }

    pub fn strength_count(&self) -> usize {
        self.strengths.len()
    }

    /// Copy of this node carrying the adjacency only.
    pub(crate) fn structural_copy(&self) -> GraphNode {
        GraphNode {
            id: self.id,
            adjacency: self.adjacency.clone(),
            strengths: HashMap::new(),
        }
    }
}

use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Node id, unique in one graph.
pub type VInt = i64;

/// Weight given to an edge read without an explicit weight column.
pub const DEFAULT_WEIGHT: f64 = 1.0;

// Define the undirected weighted edge, one record per edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub u: VInt, // Smaller endpoint (or the only endpoint for a self-loop).
    pub v: VInt, // Larger endpoint.
    pub weight: f64,
}

impl Edge {
    pub fn new(u: VInt, v: VInt, weight: f64) -> Self {
        Edge { u, v, weight }
    }

    pub fn unweighted(u: VInt, v: VInt) -> Self {
        Edge::new(u, v, DEFAULT_WEIGHT)
    }

    pub fn is_self_loop(&self) -> bool {
        self.u == self.v
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.u, self.v, self.weight)
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::config::READ_BUFFER_SIZE;
use crate::error::{CommunityError, Result};
use crate::node::GraphNode;
use crate::types::{Edge, VInt, DEFAULT_WEIGHT};

/// How an edge-list file is laid out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeListOptions {
    /// Column separator, any whitespace when `None`.
    pub delimiter: Option<String>,
    /// Read a third column as the edge weight.
    pub weighted: bool,
}

/// Undirected, optionally weighted graph kept as an adjacency map.
///
/// Every non-self edge is mirrored on both endpoints with the same weight, a
/// self-loop is stored once on its node. Nodes are ordered by id, so every
/// iteration over the graph is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedGraph {
    nodes: BTreeMap<VInt, GraphNode>,
}

impl WeightedGraph {
    pub fn new() -> Self {
        WeightedGraph::default()
    }

    /// Build an unweighted graph from `(u, v)` pairs.
    pub fn from_edges(edges: impl IntoIterator<Item = (VInt, VInt)>) -> Self {
        let mut graph = WeightedGraph::new();
        for (u, v) in edges {
            graph.add_edge(u, v);
        }
        graph
    }

    pub fn from_weighted_edges(edges: impl IntoIterator<Item = (VInt, VInt, f64)>) -> Self {
        let mut graph = WeightedGraph::new();
        for (u, v, w) in edges {
            graph.add_weighted_edge(u, v, w);
        }
        graph
    }

    /// Load a graph from an edge-list file, one edge per line.
    pub fn from_edge_list_file(path: impl AsRef<Path>, options: &EdgeListOptions) -> Result<Self> {
        let path = path.as_ref();
        let graph_file = File::open(path)
            .map_err(|e| CommunityError::ingestion(path, 0, format!("cannot open edge list: {}", e)))?;
        let graph_reader = BufReader::with_capacity(READ_BUFFER_SIZE, graph_file);
        Self::from_edge_list_reader(graph_reader, path, options)
    }

    /// Load a graph from any buffered reader. `source` only labels errors.
    pub fn from_edge_list_reader<R: BufRead>(
        reader: R,
        source: &Path,
        options: &EdgeListOptions,
    ) -> Result<Self> {
        let mut graph = WeightedGraph::new();
        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| CommunityError::ingestion(source, line_no, e.to_string()))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
                continue;
            }

            let tokens: Vec<&str> = match options.delimiter.as_deref() {
                Some(delimiter) => line
                    .split(delimiter)
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .collect(),
                None => line.split_whitespace().collect(),
            };
            let expected = if options.weighted { 3 } else { 2 };
            if tokens.len() < expected {
                return Err(CommunityError::ingestion(
                    source,
                    line_no,
                    format!("expected {} columns, found {}", expected, tokens.len()),
                ));
            }

            let u = parse_node_id(tokens[0], source, line_no)?;
            let v = parse_node_id(tokens[1], source, line_no)?;
            let weight = if options.weighted {
                match tokens[2].parse::<f64>() {
                    Ok(w) if w.is_finite() => w,
                    _ => {
                        return Err(CommunityError::ingestion(
                            source,
                            line_no,
                            format!("invalid edge weight '{}'", tokens[2]),
                        ))
                    }
                }
            } else {
                DEFAULT_WEIGHT
            };
            graph.add_weighted_edge(u, v, weight);
        }
        debug!(
            "Loaded {}: {} nodes, {} edges",
            source.display(),
            graph.node_count(),
            graph.number_of_edges()
        );
        Ok(graph)
    }

    /// Insert the node if absent and return it.
    pub fn add_node(&mut self, id: VInt) -> &mut GraphNode {
        self.nodes.entry(id).or_insert_with(|| GraphNode::new(id))
    }

    pub fn node(&self, id: VInt) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: VInt) -> Option<&mut GraphNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains_node(&self, id: VInt) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = VInt> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.nodes.values()
    }

    /// Neighbor ids of `id` in ascending order, empty for unknown nodes.
    pub fn neighbors(&self, id: VInt) -> impl Iterator<Item = VInt> + '_ {
        self.nodes.get(&id).into_iter().flat_map(|node| node.neighbor_ids())
    }

    pub fn add_edge(&mut self, u: VInt, v: VInt) {
        self.add_weighted_edge(u, v, DEFAULT_WEIGHT);
    }

    /// Add (or overwrite) the undirected edge `(u, v)`.
    pub fn add_weighted_edge(&mut self, u: VInt, v: VInt, weight: f64) {
        if u == v {
            self.add_node(u).add_connection(u, weight);
            return;
        }
        self.add_node(u).add_connection(v, weight);
        self.add_node(v).add_connection(u, weight);
    }

    pub fn has_edge(&self, u: VInt, v: VInt) -> bool {
        self.nodes.get(&u).map_or(false, |node| node.has_edge(v))
    }

    pub fn edge_weight(&self, u: VInt, v: VInt) -> f64 {
        self.nodes.get(&u).map_or(0.0, |node| node.edge_weight(v))
    }

    /// Remove the edge from both endpoints, returns whether it existed.
    pub fn remove_edge(&mut self, u: VInt, v: VInt) -> bool {
        let mut removed = false;
        if let Some(node) = self.nodes.get_mut(&u) {
            removed |= node.remove_neighbor(v).is_some();
        }
        if let Some(node) = self.nodes.get_mut(&v) {
            removed |= node.remove_neighbor(u).is_some();
        }
        removed
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: VInt) -> bool {
        // Take the node out first, its adjacency is then owned and can be
        // walked while the neighbors are edited.
        let Some(node) = self.nodes.remove(&id) else {
            return false;
        };
        for neighbor in node.neighbor_ids().filter(|&n| n != id) {
            if let Some(neighbor_node) = self.nodes.get_mut(&neighbor) {
                neighbor_node.remove_neighbor(id);
            }
        }
        true
    }

    /// Remove every self-loop, returns how many were dropped.
    pub fn remove_self_loops(&mut self) -> usize {
        let mut removed = 0usize;
        for (id, node) in self.nodes.iter_mut() {
            if node.remove_neighbor(*id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Each undirected edge once, reported from its smaller endpoint.
    pub fn edges(&self) -> Vec<Edge> {
        let mut all_edges = Vec::new();
        for node in self.nodes.values() {
            for (&neighbor, &weight) in node.neighbors() {
                if node.id() <= neighbor {
                    all_edges.push(Edge::new(node.id(), neighbor, weight));
                }
            }
        }
        all_edges
    }

    pub fn number_of_edges(&self) -> usize {
        let mut endpoint_count = 0usize;
        for node in self.nodes.values() {
            if node.has_self_loop() {
                endpoint_count += 1;
            }
            endpoint_count += node.neighbor_count();
        }
        endpoint_count / 2
    }

    /// Total edge weight of the graph.
    pub fn size(&self) -> f64 {
        let mut total_weight = 0.0f64;
        for node in self.nodes.values() {
            if node.has_self_loop() {
                total_weight += node.edge_weight(node.id());
            }
            total_weight += node.neighbors().values().sum::<f64>();
        }
        total_weight / 2.0
    }

    /// Weighted degree, a self-loop counts once. 0.0 for unknown nodes.
    pub fn degree(&self, id: VInt) -> f64 {
        self.nodes
            .get(&id)
            .map_or(0.0, |node| node.neighbors().values().sum())
    }

    pub fn common_neighbors(&self, u: VInt, v: VInt) -> BTreeSet<VInt> {
        let (Some(u_node), Some(v_node)) = (self.nodes.get(&u), self.nodes.get(&v)) else {
            return BTreeSet::new();
        };
        let (small, large) = if u_node.neighbor_count() <= v_node.neighbor_count() {
            (u_node, v_node)
        } else {
            (v_node, u_node)
        };
        small.neighbor_ids().filter(|id| large.has_edge(*id)).collect()
    }

    /// Cached structural strength of `(u, v)` as seen from `u`.
    pub fn strength(&self, u: VInt, v: VInt) -> f64 {
        self.nodes.get(&u).map_or(0.0, |node| node.strength(v))
    }

    /// Record a strength on both endpoints of `(u, v)`.
    pub(crate) fn assign_strength(&mut self, u: VInt, v: VInt, strength: f64) {
        if let Some(node) = self.nodes.get_mut(&u) {
            node.assign_strength(v, strength);
        }
        if let Some(node) = self.nodes.get_mut(&v) {
            node.assign_strength(u, strength);
        }
    }

    /// Deep copy of the structure. Strength caches are left behind.
    pub fn copy(&self) -> WeightedGraph {
        WeightedGraph {
            nodes: self
                .nodes
                .iter()
                .map(|(id, node)| (*id, node.structural_copy()))
                .collect(),
        }
    }

    pub fn print_info(&self) -> String {
        format!(
            "{} nodes, {} edges, total weight {}",
            self.node_count(),
            self.number_of_edges(),
            self.size()
        )
    }
}

fn parse_node_id(token: &str, source: &Path, line: usize) -> Result<VInt> {
    token
        .parse::<VInt>()
        .map_err(|_| CommunityError::ingestion(source, line, format!("invalid node id '{}'", token)))
}

use std::collections::BTreeSet;
use std::time::Duration;

use derive_more::Display;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::community_search::LocalSearch;
use crate::config::MIN_IMPROVEMENT;
use crate::error::{CommunityError, Result};
use crate::graph::WeightedGraph;
use crate::timeout::{budget_from_secs, SearchDeadline};
use crate::types::VInt;

/// Local modularity maximised by a [`ModularitySearch`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModularityKind {
    /// Internal edge endpoints over external ones. Grows by additions
    /// followed by deletions until neither raises the score.
    #[display(fmt = "modularity-m")]
    M,
    /// Boundary-edge sharpness. Greedy additions of the best positive gain.
    #[display(fmt = "modularity-r")]
    R,
}

/// Local community search by local modularity (M or R).
///
/// Edges are counted, weights are ignored. The community is kept with its
/// boundary (members with a neighbor outside) and its shell (outside nodes
/// next to a member).
pub struct ModularitySearch<'g> {
    graph: &'g mut WeightedGraph,
    kind: ModularityKind,
    timeout: Option<Duration>,
    seed: Option<VInt>,
    community: BTreeSet<VInt>,
    boundary: BTreeSet<VInt>,
    shell: BTreeSet<VInt>,
    timed_out: bool,
}

impl<'g> ModularitySearch<'g> {
    /// Bind a search to `graph`. Self-loops are removed from the graph.
    pub fn new(graph: &'g mut WeightedGraph, kind: ModularityKind, timeout_secs: f64) -> Self {
        let removed = graph.remove_self_loops();
        if removed > 0 {
            debug!("Removed {} self-loops before {} search", removed, kind);
        }
        ModularitySearch {
            graph,
            kind,
            timeout: budget_from_secs(timeout_secs),
            seed: None,
            community: BTreeSet::new(),
            boundary: BTreeSet::new(),
            shell: BTreeSet::new(),
            timed_out: false,
        }
    }

    pub fn kind(&self) -> ModularityKind {
        self.kind
    }

    pub fn community(&self) -> &BTreeSet<VInt> {
        &self.community
    }

    pub fn boundary(&self) -> &BTreeSet<VInt> {
        &self.boundary
    }

    pub fn shell(&self) -> &BTreeSet<VInt> {
        &self.shell
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn reset(&mut self) {
        self.seed = None;
        self.community.clear();
        self.boundary.clear();
        self.shell.clear();
        self.timed_out = false;
    }

    pub fn set_start(&mut self, seed: VInt) -> Result<()> {
        if !self.graph.contains_node(seed) {
            return Err(CommunityError::InvalidSeed(seed));
        }
        self.reset();
        self.seed = Some(seed);
        self.community.insert(seed);
        self.boundary.insert(seed);
        self.shell = self.graph.neighbors(seed).collect();
        Ok(())
    }

    /// Discover the community of `seed`, sorted ascending.
    ///
    /// Empty when the search timed out, or when modularity M evicted the seed
    /// itself.
    pub fn search(&mut self, seed: VInt) -> Result<Vec<VInt>> {
        let deadline = SearchDeadline::start(self.timeout);
        self.set_start(seed)?;

        let finished = match self.kind {
            ModularityKind::M => self.grow_m(&deadline),
            ModularityKind::R => self.grow_r(&deadline),
        };
        if !finished {
            warn!("Timeout! {} search from node {} gave up after {:?}", self.kind, seed, deadline.elapsed());
            self.timed_out = true;
            return Ok(Vec::new());
        }
        if !self.community.contains(&seed) {
            debug!("Node {} left its own {} community", seed, self.kind);
            return Ok(Vec::new());
        }
        Ok(self.community.iter().copied().collect())
    }

    fn grow_m(&mut self, deadline: &SearchDeadline) -> bool {
        let mut modularity = 0.0f64;
        while self.community.len() < self.graph.node_count() && !self.shell.is_empty() {
            if deadline.expired() {
                return false;
            }

            // Additions, lowest degree first.
            let mut candidates: Vec<VInt> = self.shell.iter().copied().collect();
            candidates.sort_by_key(|&node| self.graph.neighbors(node).count());
            let mut joined = Vec::new();
            for candidate in candidates {
                let candidate_modularity = self.modularity_m(Some(candidate), None);
                if candidate_modularity > modularity {
                    modularity = candidate_modularity;
                    self.admit(candidate);
                    joined.push(candidate);
                }
            }

            // Deletions, until a full pass removes nobody.
            loop {
                let mut evicted_any = false;
                let members: Vec<VInt> = self.community.iter().copied().collect();
                for member in members {
                    if self.community.len() == 1 {
                        break;
                    }
                    let candidate_modularity = self.modularity_m(None, Some(member));
                    if candidate_modularity > modularity {
                        modularity = candidate_modularity;
                        self.evict(member);
                        joined.retain(|&node| node != member);
                        evicted_any = true;
                    }
                }
                if !evicted_any {
                    break;
                }
            }

            if joined.is_empty() {
                break;
            }
        }
        true
    }

    /// Modularity M of the community with `added` joined and `removed` left.
    /// A community without outgoing edges scores infinity.
    fn modularity_m(&self, added: Option<VInt>, removed: Option<VInt>) -> f64 {
        let is_member = |node: VInt| Some(node) == added || (Some(node) != removed && self.community.contains(&node));
        let (mut inward, mut outward) = (0usize, 0usize);
        for node in self.community.iter().copied().chain(added).filter(|&node| is_member(node)) {
            for neighbor in self.graph.neighbors(node) {
                if is_member(neighbor) {
                    inward += 1;
                } else {
                    outward += 1;
                }
            }
        }
        match (inward, outward) {
            (0, 0) => 0.0,
            (_, 0) => f64::INFINITY,
            _ => inward as f64 / outward as f64,
        }
    }

    fn grow_r(&mut self, deadline: &SearchDeadline) -> bool {
        let mut modularity = 0.0f64;
        let mut boundary_edges = self.seed.map_or(0, |seed| self.graph.neighbors(seed).count()) as f64;
        while self.community.len() < self.graph.node_count() && !self.shell.is_empty() {
            if deadline.expired() {
                return false;
            }

            let mut best: Option<(VInt, f64, f64)> = None;
            for &candidate in &self.shell {
                let (gain, edge_change) = self.modularity_r_gain(candidate, modularity, boundary_edges);
                if best.map_or(true, |(_, best_gain, _)| gain > best_gain) {
                    best = Some((candidate, gain, edge_change));
                }
            }
            let Some((next, gain, edge_change)) = best else {
                break;
            };
            if gain < MIN_IMPROVEMENT {
                break;
            }
            modularity += gain;
            boundary_edges += edge_change;
            self.admit(next);
        }
        true
    }

    /// Change of R, and of the boundary edge count, if `candidate` joined.
    fn modularity_r_gain(&self, candidate: VInt, modularity: f64, boundary_edges: f64) -> (f64, f64) {
        let (mut to_boundary, mut to_outside) = (0usize, 0usize);
        for neighbor in self.graph.neighbors(candidate) {
            if self.boundary.contains(&neighbor) {
                to_boundary += 1;
            } else {
                to_outside += 1;
            }
        }

        // Boundary nodes turned interior by the candidate drop their edges
        // to interior members from the count.
        let mut dropped = 0usize;
        for neighbor in self.graph.neighbors(candidate).filter(|n| self.boundary.contains(n)) {
            if self.leaves_boundary(neighbor, candidate) {
                dropped += self
                    .graph
                    .neighbors(neighbor)
                    .filter(|n| self.community.contains(n) && !self.boundary.contains(n))
                    .count();
            }
        }

        let (x, y, z) = (to_boundary as f64, to_outside as f64, dropped as f64);
        let denominator = boundary_edges - z + y;
        let gain = if denominator > 0.0 {
            (x - modularity * y - z * (1.0 - modularity)) / denominator
        } else {
            0.0
        };
        (gain, y - z)
    }

    /// Whether every neighbor of `node` but `joining` is a member.
    fn leaves_boundary(&self, node: VInt, joining: VInt) -> bool {
        self.graph
            .neighbors(node)
            .filter(|&n| n != joining)
            .all(|n| self.community.contains(&n))
    }

    fn has_outside_neighbor(&self, node: VInt) -> bool {
        self.graph.neighbors(node).any(|n| !self.community.contains(&n))
    }

    fn admit(&mut self, node: VInt) {
        self.community.insert(node);
        self.shell.remove(&node);
        let neighbors: Vec<VInt> = self.graph.neighbors(node).collect();
        for &neighbor in &neighbors {
            if !self.community.contains(&neighbor) {
                self.shell.insert(neighbor);
            }
        }

        if self.has_outside_neighbor(node) {
            self.boundary.insert(node);
        }
        for neighbor in neighbors {
            if self.boundary.contains(&neighbor) && !self.has_outside_neighbor(neighbor) {
                self.boundary.remove(&neighbor);
            }
        }
    }

    fn evict(&mut self, node: VInt) {
        self.community.remove(&node);
        self.boundary.remove(&node);
        let neighbors: Vec<VInt> = self.graph.neighbors(node).collect();
        for neighbor in neighbors {
            if self.community.contains(&neighbor) {
                self.boundary.insert(neighbor);
            } else if self.shell.contains(&neighbor)
                && !self.graph.neighbors(neighbor).any(|n| self.community.contains(&n))
            {
                self.shell.remove(&neighbor);
            }
        }
        self.shell.insert(node);
    }
}

impl LocalSearch for ModularitySearch<'_> {
    /// Modularity searches never amend.
    fn search(&mut self, seed: VInt, _amend: bool) -> Result<Vec<VInt>> {
        ModularitySearch::search(self, seed)
    }

    fn reset(&mut self) {
        ModularitySearch::reset(self)
    }

    fn timed_out(&self) -> bool {
        self.timed_out
    }
}

#[cfg(test)]
mod test_modularity {
    use std::collections::BTreeSet;

    use crate::community_search::modularity::{ModularityKind, ModularitySearch};
    use crate::error::CommunityError;
    use crate::graph::WeightedGraph;

    fn two_cliques() -> WeightedGraph {
        let mut edges = vec![];
        for group in [[1i64, 2, 3, 4], [5, 6, 7, 8]] {
            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    edges.push((group[i], group[j]));
                }
            }
        }
        edges.push((4, 5));
        WeightedGraph::from_edges(edges)
    }

    #[test]
    fn test_both_kinds_separate_cliques() {
        for kind in [ModularityKind::M, ModularityKind::R] {
            let mut g = two_cliques();
            let mut search = ModularitySearch::new(&mut g, kind, 30.0);
            assert_eq!(search.search(1).unwrap(), vec![1, 2, 3, 4], "{}", kind);
            assert_eq!(search.search(7).unwrap(), vec![5, 6, 7, 8], "{}", kind);
            assert!(!search.timed_out());
        }
    }

    #[test]
    fn test_modularity_m_takes_closed_component() {
        let mut g = WeightedGraph::from_edges(vec![(1, 2), (2, 3), (1, 3), (5, 6)]);
        let mut search = ModularitySearch::new(&mut g, ModularityKind::M, 30.0);
        assert_eq!(search.search(1).unwrap(), vec![1, 2, 3]);
        assert!(search.shell().is_empty());
    }

    #[test]
    fn test_modularity_m_scores() {
        let mut g = two_cliques();
        let mut search = ModularitySearch::new(&mut g, ModularityKind::M, 30.0);
        search.set_start(1).unwrap();
        // {1, 2}: two inward endpoints, four outward.
        assert_eq!(search.modularity_m(Some(2), None), 0.5);
        search.admit(2);
        search.admit(3);
        assert_eq!(search.modularity_m(None, None), 2.0);
        assert_eq!(search.modularity_m(Some(4), None), 12.0);
        assert_eq!(search.modularity_m(None, Some(3)), 0.5);
    }

    #[test]
    fn test_boundary_follows_membership() {
        let mut g = two_cliques();
        let mut search = ModularitySearch::new(&mut g, ModularityKind::R, 30.0);
        search.set_start(1).unwrap();
        for node in [2, 3, 4] {
            search.admit(node);
        }
        // Only node 4 still touches the outside.
        assert_eq!(search.boundary(), &BTreeSet::from([4]));
        assert_eq!(search.shell(), &BTreeSet::from([5]));

        search.evict(4);
        assert_eq!(search.boundary(), &BTreeSet::from([1, 2, 3]));
        assert_eq!(search.shell(), &BTreeSet::from([4]));
    }

    #[test]
    fn test_modularity_r_first_gain() {
        let mut g = two_cliques();
        let mut search = ModularitySearch::new(&mut g, ModularityKind::R, 30.0);
        search.set_start(1).unwrap();
        // One edge into the boundary, two out, three boundary edges so far.
        let (gain, edge_change) = search.modularity_r_gain(2, 0.0, 3.0);
        assert!((gain - 0.2).abs() < 1e-12);
        assert_eq!(edge_change, 2.0);
    }

    #[test]
    fn test_isolated_seed_and_invalid_seed() {
        let mut g = two_cliques();
        g.add_node(40);
        let mut search = ModularitySearch::new(&mut g, ModularityKind::R, 30.0);
        assert_eq!(search.search(40).unwrap(), vec![40]);
        assert!(matches!(search.search(41), Err(CommunityError::InvalidSeed(41))));
    }

    #[test]
    fn test_zero_timeout() {
        let mut g = two_cliques();
        let mut search = ModularitySearch::new(&mut g, ModularityKind::M, 0.0);
        assert!(search.search(1).unwrap().is_empty());
        assert!(search.timed_out());
        search.reset();
        assert!(!search.timed_out());
    }
}

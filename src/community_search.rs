use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use derive_more::Display;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::{DANGLING_DEGREE, MIN_IMPROVEMENT, SMALL_COMMUNITY_SIZE};
use crate::error::{CommunityError, Result};
use crate::graph::WeightedGraph;
use crate::timeout::{budget_from_secs, SearchDeadline};
use crate::types::VInt;

pub mod batch;
pub mod modularity;
pub mod strength;

pub use batch::{run_queries, run_queries_parallel, QueryOutcome};
pub use modularity::{ModularityKind, ModularitySearch};
pub use strength::{StrengthIndex, StrengthMode};

/// A seed-driven community search bound to one graph.
pub trait LocalSearch {
    /// Community of `seed` sorted ascending, empty when the search ran out of
    /// time. `amend` asks for small-community amendment where supported.
    fn search(&mut self, seed: VInt, amend: bool) -> Result<Vec<VInt>>;

    /// Forget the previous search, keeping any graph-wide caches.
    fn reset(&mut self);

    /// Whether the last search ran out of time.
    fn timed_out(&self) -> bool;
}

/// Objective driving a local search.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMethod {
    /// Structural strength (LSIWO).
    #[default]
    #[display(fmt = "strength")]
    Strength,
    #[display(fmt = "modularity-m")]
    ModularityM,
    #[display(fmt = "modularity-r")]
    ModularityR,
}

/// Bind a searcher of `method` to `graph`. `mode` only applies to
/// [`SearchMethod::Strength`].
pub fn local_searcher<'g>(
    graph: &'g mut WeightedGraph,
    method: SearchMethod,
    mode: StrengthMode,
    timeout_secs: f64,
) -> Box<dyn LocalSearch + 'g> {
    match method {
        SearchMethod::Strength => Box::new(CommunitySearchEngine::new(graph, mode, timeout_secs)),
        SearchMethod::ModularityM => Box::new(ModularitySearch::new(graph, ModularityKind::M, timeout_secs)),
        SearchMethod::ModularityR => Box::new(ModularitySearch::new(graph, ModularityKind::R, timeout_secs)),
    }
}

/// Per-search state: the growing community and its frontier.
#[derive(Debug, Clone, Default)]
struct SearchFrontier {
    seed: Option<VInt>,
    community: Vec<VInt>, // Admission order.
    members: HashSet<VInt>, // Same ids as `community`, for lookups.
    shell: BTreeSet<VInt>, // Adjacent to the community, not yet in it.
    improvements: HashMap<VInt, f64>, // Accumulated score of each candidate.
}

impl SearchFrontier {
    fn admit(&mut self, node: VInt) -> bool {
        if self.members.insert(node) {
            self.community.push(node);
            self.shell.remove(&node);
            true
        } else {
            false
        }
    }
}

/// Local community search (LSIWO) bound to one graph.
///
/// The engine grows a community from a seed by repeatedly admitting the
/// frontier node with the largest accumulated structural strength to the
/// community. Strength bookkeeping is graph-wide and survives [`reset`], so a
/// batch of searches over one graph shares the work.
///
/// [`reset`]: CommunitySearchEngine::reset
pub struct CommunitySearchEngine<'g> {
    graph: &'g mut WeightedGraph,
    index: StrengthIndex,
    timeout: Option<Duration>,
    frontier: SearchFrontier,
    excluded: HashSet<VInt>, // Never enter a shell or a dangling merge.
    timed_out: bool,
}

impl<'g> CommunitySearchEngine<'g> {
    /// Bind an engine to `graph`. Self-loops are removed from the graph.
    pub fn new(graph: &'g mut WeightedGraph, mode: StrengthMode, timeout_secs: f64) -> Self {
        Self::with_budget(graph, mode, budget_from_secs(timeout_secs))
    }

    /// Engine whose searches never time out.
    pub fn unbounded(graph: &'g mut WeightedGraph, mode: StrengthMode) -> Self {
        Self::with_budget(graph, mode, None)
    }

    fn with_budget(graph: &'g mut WeightedGraph, mode: StrengthMode, timeout: Option<Duration>) -> Self {
        let removed = graph.remove_self_loops();
        if removed > 0 {
            debug!("Removed {} self-loops before community search", removed);
        }
        CommunitySearchEngine {
            graph,
            index: StrengthIndex::new(mode),
            timeout,
            frontier: SearchFrontier::default(),
            excluded: HashSet::new(),
            timed_out: false,
        }
    }

    pub fn graph(&self) -> &WeightedGraph {
        &*self.graph
    }

    pub fn strength_mode(&self) -> StrengthMode {
        self.index.mode()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn strength_index(&self) -> &StrengthIndex {
        &self.index
    }

    pub fn starting_node(&self) -> Option<VInt> {
        self.frontier.seed
    }

    /// Current community in admission order (sorted once a search returns).
    pub fn community(&self) -> &[VInt] {
        &self.frontier.community
    }

    pub fn shell(&self) -> &BTreeSet<VInt> {
        &self.frontier.shell
    }

    /// Whether the last search ran out of time.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Drop the community and shell of the previous search. Strength and
    /// common-neighbor caches are kept.
    pub fn reset(&mut self) {
        self.frontier = SearchFrontier::default();
        self.timed_out = false;
    }

    pub(crate) fn exclude(&mut self, ids: impl IntoIterator<Item = VInt>) {
        self.excluded.extend(ids);
    }

    pub(crate) fn clear_excluded(&mut self) {
        self.excluded.clear();
    }

    /// Start a new community at `seed`: the community is `[seed]` and the
    /// shell is the seed's neighborhood.
    pub fn set_start(&mut self, seed: VInt) -> Result<()> {
        if !self.graph.contains_node(seed) {
            return Err(CommunityError::InvalidSeed(seed));
        }
        let mut frontier = SearchFrontier {
            seed: Some(seed),
            ..Default::default()
        };
        frontier.admit(seed);
        frontier.shell = self
            .graph
            .neighbors(seed)
            .filter(|n| *n != seed && !self.excluded.contains(n))
            .collect();
        self.frontier = frontier;
        Ok(())
    }

    /// Discover the community of `seed`.
    ///
    /// Returns the member ids in ascending order, or an empty list when the
    /// search exceeded its time budget. With `amend` set, a community smaller
    /// than three nodes is merged with the community grown from its strongest
    /// frontier node.
    pub fn search(&mut self, seed: VInt, amend: bool) -> Result<Vec<VInt>> {
        self.run(seed, amend, true)
    }

    pub(crate) fn run(&mut self, seed: VInt, amend: bool, merge_dangling: bool) -> Result<Vec<VInt>> {
        let deadline = SearchDeadline::start(self.timeout);
        self.timed_out = false;
        self.set_start(seed)?;
        self.index.assign_local_strength(self.graph, seed);

        if !self.grow(&deadline) {
            warn!("Timeout! Search from node {} gave up after {:?}", seed, deadline.elapsed());
            self.timed_out = true;
            return Ok(Vec::new());
        }

        if amend {
            self.amend_small_community()?;
        }
        if merge_dangling {
            self.merge_dangling_nodes();
        }

        let mut members = std::mem::take(&mut self.frontier.community);
        members.sort_unstable();
        members.dedup();
        self.frontier.community = members.clone();
        debug!("Community of node {}: {} members", seed, members.len());
        Ok(members)
    }

    /// Admit frontier nodes until growth stalls. Returns `false` on timeout.
    fn grow(&mut self, deadline: &SearchDeadline) -> bool {
        while self.frontier.community.len() < self.graph.node_count() && !self.frontier.shell.is_empty() {
            if deadline.expired() {
                return false;
            }

            for &node in &self.frontier.shell {
                self.index.assign_local_strength(self.graph, node);
            }

            let Some((best_next_node, improvement)) = self.find_best_next_node() else {
                break;
            };
            if should_stop(self.index.mode(), self.frontier.community.len(), improvement) {
                break;
            }
            self.update_sets_when_node_joins(best_next_node);
        }
        true
    }

    /// Fold the newest member into every candidate's score and return the
    /// best candidate. Ties go to the smallest id.
    fn find_best_next_node(&mut self) -> Option<(VInt, f64)> {
        let newest = *self.frontier.community.last()?;
        let graph = &*self.graph;
        let frontier = &mut self.frontier;

        for &node in &frontier.shell {
            match frontier.improvements.entry(node) {
                Entry::Vacant(slot) => {
                    slot.insert(graph.strength(node, newest));
                }
                Entry::Occupied(mut slot) => {
                    // Only candidates touching the newest member gain.
                    if graph.has_edge(node, newest) {
                        *slot.get_mut() += graph.strength(node, newest);
                    }
                }
            }
        }
        frontier.improvements.remove(&newest);

        let mut best: Option<(VInt, f64)> = None;
        for &candidate in &frontier.shell {
            let improvement = frontier.improvements.get(&candidate).copied().unwrap_or(0.0);
            if best.map_or(true, |(_, best_improvement)| improvement > best_improvement) {
                best = Some((candidate, improvement));
            }
        }
        best
    }

    fn update_sets_when_node_joins(&mut self, node: VInt) {
        self.frontier.admit(node);
        let frontier = &mut self.frontier;
        let excluded = &self.excluded;
        frontier.shell.extend(
            self.graph
                .neighbors(node)
                .filter(|n| !frontier.members.contains(n) && !excluded.contains(n)),
        );
    }

    /// Pull in every neighbor of the community whose weighted degree is
    /// exactly 1.0.
    fn merge_dangling_nodes(&mut self) {
        let mut neighborhood = BTreeSet::new();
        for &member in &self.frontier.community {
            neighborhood.extend(self.graph.neighbors(member).filter(|n| !self.excluded.contains(n)));
        }

        for node in neighborhood {
            if self.graph.degree(node) == DANGLING_DEGREE && self.frontier.admit(node) {
                debug!("Dangling node {} merged", node);
            }
        }
    }

    /// Rescue a community of fewer than three nodes by searching again from
    /// the highest-degree frontier node and taking the union.
    fn amend_small_community(&mut self) -> Result<()> {
        if self.frontier.community.len() >= SMALL_COMMUNITY_SIZE {
            return Ok(());
        }

        let mut start_node_for_amend = None;
        let mut largest_degree = f64::NEG_INFINITY;
        for &node in &self.frontier.shell {
            let degree = self.graph.degree(node);
            if degree > largest_degree {
                start_node_for_amend = Some(node);
                largest_degree = degree;
            }
        }
        let Some(start) = start_node_for_amend else {
            return Ok(());
        };
        debug!(
            "Community of node {:?} has {} members, amending from node {}",
            self.frontier.seed,
            self.frontier.community.len(),
            start
        );

        // The nested search shares the strength caches but not the frontier,
        // and never amends again.
        let outer = std::mem::take(&mut self.frontier);
        let nested = self.run(start, false, true);
        self.frontier = outer;
        self.timed_out = false;

        for member in nested? {
            self.frontier.admit(member);
        }
        Ok(())
    }
}

impl LocalSearch for CommunitySearchEngine<'_> {
    fn search(&mut self, seed: VInt, amend: bool) -> Result<Vec<VInt>> {
        CommunitySearchEngine::search(self, seed, amend)
    }

    fn reset(&mut self) {
        CommunitySearchEngine::reset(self)
    }

    fn timed_out(&self) -> bool {
        self.timed_out
    }
}

/// Whether a community of `size` members stops growing when its best
/// candidate scores `improvement`.
fn should_stop(mode: StrengthMode, size: usize, improvement: f64) -> bool {
    match mode {
        StrengthMode::Difference => improvement < MIN_IMPROVEMENT,
        // Size exactly 3 matches neither branch.
        StrengthMode::Average => {
            (size > SMALL_COMMUNITY_SIZE && improvement < MIN_IMPROVEMENT + 1.0)
                || (size < SMALL_COMMUNITY_SIZE && improvement < MIN_IMPROVEMENT)
        }
    }
}

#[cfg(test)]
mod test_community_search {
    use std::collections::BTreeSet;

    use crate::community_search::{should_stop, CommunitySearchEngine, StrengthMode};
    use crate::config::MIN_IMPROVEMENT;
    use crate::error::CommunityError;
    use crate::graph::WeightedGraph;

    const LONG_TIMEOUT: f64 = 60.0;

    fn triangle_with_pendant() -> WeightedGraph {
        WeightedGraph::from_edges(vec![(1, 2), (1, 3), (2, 3), (3, 4)])
    }

    /// Two 4-cliques joined by the single edge 4-5.
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
    fn test_triangle_with_pendant() {
        let mut g = triangle_with_pendant();
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, LONG_TIMEOUT);
        let community = engine.search(1, true).unwrap();
        assert_eq!(community, vec![1, 2, 3, 4]);
        assert!(!engine.timed_out());
        assert_eq!(engine.community(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_two_cliques_are_separated() {
        for mode in [StrengthMode::Difference, StrengthMode::Average] {
            let mut g = two_cliques();
            let mut engine = CommunitySearchEngine::new(&mut g, mode, LONG_TIMEOUT);
            assert_eq!(engine.search(1, true).unwrap(), vec![1, 2, 3, 4], "mode {}", mode);
            engine.reset();
            assert_eq!(engine.search(7, true).unwrap(), vec![5, 6, 7, 8], "mode {}", mode);
        }
    }

    #[test]
    fn test_zero_timeout_gives_empty() {
        let mut g = two_cliques();
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, 0.0);
        let community = engine.search(1, true).unwrap();
        assert!(community.is_empty());
        assert!(engine.timed_out());

        // The engine stays usable.
        engine.reset();
        assert!(!engine.timed_out());
    }

    #[test]
    fn test_invalid_seed() {
        let mut g = triangle_with_pendant();
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Average, LONG_TIMEOUT);
        match engine.search(42, true) {
            Err(CommunityError::InvalidSeed(42)) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert!(engine.set_start(7).is_err());
        engine.reset();
        assert_eq!(engine.search(2, true).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_set_start() {
        let mut g = triangle_with_pendant();
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, LONG_TIMEOUT);
        engine.set_start(3).unwrap();
        assert_eq!(engine.community(), &[3]);
        assert_eq!(engine.shell(), &BTreeSet::from([1, 2, 4]));
        assert_eq!(engine.starting_node(), Some(3));
    }

    #[test]
    fn test_reset_keeps_caches() {
        let mut g = two_cliques();
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, LONG_TIMEOUT);
        engine.search(1, true).unwrap();
        let pairs = engine.strength_index().cached_pair_count();
        let finalized = engine.strength_index().finalized_count();
        assert!(pairs > 0 && finalized > 0);

        engine.reset();
        assert!(engine.community().is_empty());
        assert!(engine.shell().is_empty());
        assert_eq!(engine.strength_index().cached_pair_count(), pairs);
        assert_eq!(engine.strength_index().finalized_count(), finalized);
    }

    #[test]
    fn test_dangling_nodes_merged() {
        // Star around 1 inside a triangle 1-2-3, leaves 10 and 11 hang off 1.
        let mut g = WeightedGraph::from_edges(vec![(1, 2), (2, 3), (1, 3), (1, 10), (1, 11)]);
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, LONG_TIMEOUT);
        let community = engine.search(2, true).unwrap();
        for leaf in [10, 11] {
            assert!(community.contains(&leaf));
        }
        assert!(community.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_small_community_is_amended() {
        // Node 9 only reaches clique {1,2,3,4} through a path 9-8-1.
        let mut g = WeightedGraph::from_edges(vec![
            (1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4), (1, 8), (8, 9), (9, 10), (9, 11),
        ]);
        g.add_edge(10, 11);
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, LONG_TIMEOUT);
        let plain = engine.search(8, false).unwrap();
        assert_eq!(plain, vec![8]);

        engine.reset();
        let amended = engine.search(8, true).unwrap();
        assert!(amended.contains(&8));
        assert!(amended.contains(&1));
        assert!(amended.len() > plain.len());
    }

    #[test]
    fn test_amendment_runs_before_dangling_merge() {
        // Leaves 2 and 3 hang off seed 1, node 4 leads to triangle {4,5,6}.
        let mut g = WeightedGraph::from_edges(vec![(1, 2), (1, 3), (1, 4), (4, 5), (4, 6), (5, 6)]);
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, LONG_TIMEOUT);
        assert_eq!(engine.search(1, true).unwrap(), vec![1, 2, 3, 4, 5, 6]);

        engine.reset();
        assert_eq!(engine.search(1, false).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_average_stop_rule() {
        let average = StrengthMode::Average;
        // Below three members only a non-positive gain stops.
        assert!(should_stop(average, 2, MIN_IMPROVEMENT / 2.0));
        assert!(!should_stop(average, 2, 0.5));
        assert!(!should_stop(average, 1, MIN_IMPROVEMENT));
        // Three members never stop on the score.
        assert!(!should_stop(average, 3, 0.0));
        assert!(!should_stop(average, 3, -0.5));
        // Above three members a gain must exceed one.
        assert!(should_stop(average, 4, 0.5));
        assert!(should_stop(average, 4, 1.0));
        assert!(should_stop(average, 7, MIN_IMPROVEMENT));
        assert!(!should_stop(average, 4, 1.0 + 2.0 * MIN_IMPROVEMENT));
        assert!(!should_stop(average, 4, 1.5));
    }

    #[test]
    fn test_difference_stop_rule() {
        let difference = StrengthMode::Difference;
        for size in [1, 2, 3, 4, 10] {
            assert!(should_stop(difference, size, 0.0));
            assert!(should_stop(difference, size, -1.0));
            assert!(!should_stop(difference, size, MIN_IMPROVEMENT));
            assert!(!should_stop(difference, size, 0.5));
        }
    }

    #[test]
    fn test_average_admits_fourth_member_at_size_three() {
        // Triangle {1,2,3} joined by 3-4 to triangle {4,5,6}.
        let edges = vec![(1, 2), (1, 3), (2, 3), (3, 4), (4, 5), (4, 6), (5, 6)];

        let mut g = WeightedGraph::from_edges(edges.clone());
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Average, LONG_TIMEOUT);
        // Node 4 scores 0.0 but joins a community of three. At size four the
        // best candidate scores exactly 1.0, which stops growth.
        assert_eq!(engine.search(1, false).unwrap(), vec![1, 2, 3, 4]);

        let mut g = WeightedGraph::from_edges(edges);
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, LONG_TIMEOUT);
        assert_eq!(engine.search(1, false).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_self_loops_removed_on_bind() {
        let mut g = triangle_with_pendant();
        g.add_edge(2, 2);
        {
            let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Difference, LONG_TIMEOUT);
            assert_eq!(engine.search(1, true).unwrap(), vec![1, 2, 3, 4]);
        }
        assert!(!g.has_edge(2, 2));
    }

    #[test]
    fn test_isolated_seed() {
        let mut g = triangle_with_pendant();
        g.add_node(50);
        let mut engine = CommunitySearchEngine::new(&mut g, StrengthMode::Average, 0.0);
        // No shell means no growth iteration, hence no timeout check.
        assert_eq!(engine.search(50, true).unwrap(), vec![50]);
    }
}

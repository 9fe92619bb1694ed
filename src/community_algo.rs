use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;

use crate::community_search::{CommunitySearchEngine, StrengthMode};
use crate::config::SMALL_COMMUNITY_SIZE;
use crate::error::Result;
use crate::graph::WeightedGraph;
use crate::types::VInt;

/// Options of a whole-graph partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOptions {
    pub strength_mode: StrengthMode,
    /// Merge dangling nodes into communities, and fold communities of one or
    /// two nodes into their best connected neighbor community.
    pub merge_outliers: bool,
    /// Let a node belong to several communities.
    pub detect_overlap: bool,
    /// Pick start nodes at random from this seed instead of by ascending id.
    pub seed: Option<u64>,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        PartitionOptions {
            strength_mode: StrengthMode::default(),
            merge_outliers: true,
            detect_overlap: false,
            seed: None,
        }
    }
}

/// Community detection over the whole graph by repeated local searches
/// (LSWL+). Every node ends up in at least one community.
pub struct CommunityDetector<'g> {
    engine: CommunitySearchEngine<'g>,
    options: PartitionOptions,
    processed: BTreeSet<VInt>,
    partition: Vec<Vec<VInt>>,
    rng: Option<StdRng>,
}

impl<'g> CommunityDetector<'g> {
    pub fn new(graph: &'g mut WeightedGraph, options: PartitionOptions) -> Self {
        let rng = options.seed.map(StdRng::seed_from_u64);
        CommunityDetector {
            engine: CommunitySearchEngine::unbounded(graph, options.strength_mode),
            options,
            processed: BTreeSet::new(),
            partition: Vec::new(),
            rng,
        }
    }

    /// Split the graph into communities. Each community is sorted and the
    /// partition itself is sorted.
    pub fn detect(mut self) -> Result<Vec<Vec<VInt>>> {
        let node_count = self.engine.graph().node_count();
        while self.processed.len() < node_count {
            let Some(start) = self.next_start_node() else {
                break;
            };
            self.find_community(start)?;
        }
        self.engine.clear_excluded();

        if self.options.merge_outliers {
            self.amend_partition();
        }
        for community in self.partition.iter_mut() {
            community.sort_unstable();
        }
        self.partition.sort();
        info!("Partition found {} communities over {} nodes", self.partition.len(), node_count);
        Ok(self.partition)
    }

    fn next_start_node(&mut self) -> Option<VInt> {
        let processed = &self.processed;
        let mut remaining = self.engine.graph().node_ids().filter(|id| !processed.contains(id));
        match self.rng.as_mut() {
            Some(rng) => remaining.choose(rng),
            None => remaining.next(),
        }
    }

    fn find_community(&mut self, start: VInt) -> Result<()> {
        let community = self.engine.run(start, false, self.options.merge_outliers)?;
        self.engine.reset();
        debug!("Community from node {}: {} members", start, community.len());

        self.processed.extend(community.iter().copied());
        if !self.options.detect_overlap {
            self.engine.exclude(community.iter().copied());
        }
        self.partition.push(community);
        Ok(())
    }

    /// Fold every community of one or two nodes into the neighboring
    /// community it shares the most edge weight with.
    fn amend_partition(&mut self) {
        let (small, kept): (Vec<Vec<VInt>>, Vec<Vec<VInt>>) = std::mem::take(&mut self.partition)
            .into_iter()
            .partition(|community| community.len() < SMALL_COMMUNITY_SIZE);
        self.partition = kept;

        let graph = self.engine.graph();
        for community in small {
            // Community index -> total weight of edges into it.
            let mut strength_map = BTreeMap::<usize, f64>::new();
            let neighbors: BTreeSet<VInt> = community.iter().flat_map(|&node| graph.neighbors(node)).collect();
            for neighbor in neighbors {
                let Some(index) = self.partition.iter().position(|c| c.contains(&neighbor)) else {
                    continue;
                };
                for &node in &community {
                    if graph.has_edge(node, neighbor) {
                        *strength_map.entry(index).or_insert(0.0) += graph.edge_weight(node, neighbor);
                    }
                }
            }

            let mut best: Option<(usize, f64)> = None;
            for (&index, &weight) in &strength_map {
                if best.map_or(true, |(_, best_weight)| weight > best_weight) {
                    best = Some((index, weight));
                }
            }
            match best {
                Some((index, _)) => {
                    let target = &mut self.partition[index];
                    for node in community {
                        if !target.contains(&node) {
                            target.push(node);
                        }
                    }
                    target.sort_unstable();
                }
                None => self.partition.push(community),
            }
        }
    }
}

use log::{error, info};
use rayon::prelude::*;

use crate::community_search::{local_searcher, LocalSearch, SearchMethod, StrengthMode};
use crate::error::CommunityError;
use crate::graph::WeightedGraph;
use crate::types::VInt;

/// Result of one query of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Sorted member ids.
    Community(Vec<VInt>),
    /// The search exceeded its time budget.
    TimedOut,
    /// The query id is not a node of the graph.
    InvalidSeed,
    /// The search failed for another reason.
    Failed(String),
}

impl QueryOutcome {
    /// Member ids, empty unless a community was found.
    pub fn members(&self) -> &[VInt] {
        match self {
            QueryOutcome::Community(members) => members,
            QueryOutcome::TimedOut | QueryOutcome::InvalidSeed | QueryOutcome::Failed(_) => &[],
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, QueryOutcome::Community(_))
    }
}

/// Run one search per query on a single searcher, resetting between queries.
/// A failing query is recorded and the batch carries on.
pub fn run_queries<S: LocalSearch + ?Sized>(engine: &mut S, queries: &[VInt], amend: bool) -> Vec<(VInt, QueryOutcome)> {
    let mut outcomes = Vec::with_capacity(queries.len());
    for &query in queries {
        let outcome = match engine.search(query, amend) {
            Ok(_) if engine.timed_out() => QueryOutcome::TimedOut,
            Ok(members) => QueryOutcome::Community(members),
            Err(CommunityError::InvalidSeed(seed)) => {
                error!("Invalid starting node {}, skipped", seed);
                QueryOutcome::InvalidSeed
            }
            Err(e) => {
                error!("Query {} failed: {}", query, e);
                QueryOutcome::Failed(e.to_string())
            }
        };
        outcomes.push((query, outcome));
        engine.reset();
    }
    outcomes
}

/// Run the queries in parallel. Each worker searches a private copy of the
/// graph with its own engine, so no strength cache is shared across threads.
/// Outcomes come back in query order.
pub fn run_queries_parallel(
    graph: &WeightedGraph,
    queries: &[VInt],
    method: SearchMethod,
    mode: StrengthMode,
    timeout_secs: f64,
    amend: bool,
    chunk_size: usize,
) -> Vec<(VInt, QueryOutcome)> {
    let chunk_size = chunk_size.max(1);
    info!(
        "Searching {} queries in chunks of {} on {} threads",
        queries.len(),
        chunk_size,
        rayon::current_num_threads()
    );
    let per_chunk: Vec<Vec<(VInt, QueryOutcome)>> = queries
        .par_chunks(chunk_size)
        .map(|chunk| {
            let mut local_graph = graph.copy();
            let mut searcher = local_searcher(&mut local_graph, method, mode, timeout_secs);
            run_queries(searcher.as_mut(), chunk, amend)
        })
        .collect();
    per_chunk.into_iter().flatten().collect()
}

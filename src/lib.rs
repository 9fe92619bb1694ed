//! Local community search on undirected weighted graphs.
//!
//! [`CommunitySearchEngine`] grows the community of a seed node by structural
//! strength (normalised common-neighbor overlap), then merges dangling
//! neighbors and rescues communities that came out too small.
//! [`ModularitySearch`] grows the same kind of community by local modularity
//! instead. [`CommunityDetector`] partitions a whole graph with the
//! strength engine.

pub mod community_algo;
pub mod community_search;
pub mod config;
pub mod error;
pub mod graph;
pub mod logger;
pub mod node;
pub mod query;
pub mod timeout;
pub mod types;

pub use community_algo::{CommunityDetector, PartitionOptions};
pub use community_search::{
    local_searcher, run_queries, run_queries_parallel, CommunitySearchEngine, LocalSearch, ModularityKind,
    ModularitySearch, QueryOutcome, SearchMethod, StrengthMode,
};
pub use config::SearchConfig;
pub use error::{CommunityError, Result};
pub use graph::{EdgeListOptions, WeightedGraph};
pub use node::GraphNode;
pub use types::{Edge, VInt};

use std::path::PathBuf;

use thiserror::Error;

use crate::types::VInt;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, CommunityError>;

/// Errors surfaced by graph ingestion and community search.
///
/// A search that runs out of time is not an error, it yields an empty
/// community instead.
#[derive(Debug, Error)]
pub enum CommunityError {
    /// The seed id is not a node of the graph.
    #[error("invalid seed: node {0} is not in the graph")]
    InvalidSeed(VInt),

    /// A line of an input file could not be parsed.
    #[error("{}:{line}: {message}", .path.display())]
    Ingestion {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CommunityError {
    pub(crate) fn ingestion(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        CommunityError::Ingestion {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

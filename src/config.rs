use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::community_search::{SearchMethod, StrengthMode};
use crate::error::{CommunityError, Result};

/// Smallest score gain that still admits a candidate.
pub(crate) const MIN_IMPROVEMENT: f64 = 0.000001;

/// Communities below this size are amended (search) or merged away (partition).
pub(crate) const SMALL_COMMUNITY_SIZE: usize = 3;

/// Weighted degree of a dangling node.
pub(crate) const DANGLING_DEGREE: f64 = 1.0;

pub(crate) const READ_BUFFER_SIZE: usize = 8 * 1024 * 1024;

pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

/// Queries handed to one parallel worker at a time.
pub const DEFAULT_PARALLEL_CHUNK: usize = 64;

/// File-level settings shared by the `search` and `detect` commands.
/// Command line flags take precedence over these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub method: SearchMethod,
    pub strength_mode: StrengthMode,
    pub timeout_secs: f64,
    pub delimiter: Option<String>,
    pub weighted: bool,
    pub amend_small: bool,
    pub parallel: bool,
    pub parallel_chunk: usize,
    pub merge_outliers: bool,
    pub detect_overlap: bool,
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            method: SearchMethod::default(),
            strength_mode: StrengthMode::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            delimiter: None,
            weighted: false,
            amend_small: true,
            parallel: false,
            parallel_chunk: DEFAULT_PARALLEL_CHUNK,
            merge_outliers: true,
            detect_overlap: false,
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: SearchConfig =
            serde_yaml::from_str(text).map_err(|e| CommunityError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs.is_nan() || self.timeout_secs < 0.0 {
            return Err(CommunityError::Config(format!(
                "timeout_secs must be non-negative, got {}",
                self.timeout_secs
            )));
        }
        if self.parallel_chunk == 0 {
            return Err(CommunityError::Config("parallel_chunk must be positive".to_owned()));
        }
        if matches!(self.delimiter.as_deref(), Some("")) {
            return Err(CommunityError::Config("delimiter must not be empty".to_owned()));
        }
        Ok(())
    }
}

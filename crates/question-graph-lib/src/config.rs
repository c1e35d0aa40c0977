/*
Build configuration for the similarity graph.

Defaults mirror the production values: cosine threshold 0.85, the
"question-summary" label for structured records and "uncategorized" for
transcript turns without a category. The struct is serde-friendly so a JSON
file can supply any subset of fields; missing fields keep their defaults.
*/

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Default cosine similarity threshold (inclusive) for merging questions.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;
/// Category assigned to structured records that carry none.
pub const STRUCTURED_CATEGORY: &str = "question-summary";
/// Category assigned to transcript questions whose user turn carries none.
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Cosine similarity to the group representative required to join a group.
    pub similarity_threshold: f32,
    /// Fallback category for structured records.
    pub structured_category: String,
    /// Fallback category for transcript questions.
    pub default_category: String,
    /// Worker threads for the real embedding pool.
    pub embed_workers: usize,
    /// Per-worker cache size for the real embedding pool (0 disables caching).
    pub embed_cache_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            structured_category: STRUCTURED_CATEGORY.to_string(),
            default_category: UNCATEGORIZED.to_string(),
            embed_workers: 4,
            embed_cache_size: 0,
        }
    }
}

impl GraphConfig {
    /// Load a configuration from a JSON file. Absent fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let cfg: GraphConfig = serde_json::from_reader(reader)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Builder-style threshold override.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let t = self.similarity_threshold;
        if !t.is_finite() || !(-1.0..=1.0).contains(&t) {
            return Err(GraphError::Config(format!(
                "similarity_threshold must be within [-1, 1], got {t}"
            )));
        }
        if self.structured_category.trim().is_empty() || self.default_category.trim().is_empty() {
            return Err(GraphError::Config(
                "fallback categories must not be empty".to_string(),
            ));
        }
        if self.embed_workers == 0 {
            return Err(GraphError::Config(
                "embed_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = GraphConfig::default();
        assert_eq!(cfg.similarity_threshold, 0.85);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(GraphConfig::default().with_threshold(1.5).validate().is_err());
        assert!(GraphConfig::default()
            .with_threshold(f32::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"similarity_threshold": 0.9}}"#).unwrap();
        let cfg = GraphConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.similarity_threshold, 0.9);
        assert_eq!(cfg.default_category, UNCATEGORIZED);
        assert_eq!(cfg.embed_workers, 4);
    }
}

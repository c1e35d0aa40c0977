//! Error taxonomy for the graph build.
//!
//! Only some variants ever reach a caller. `MalformedRecord` is recovered by the
//! normalizer (the record is skipped) and `DimensionMismatch` by the resolver
//! (the vector is regenerated). Everything else aborts the build for that user.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    /// A stored history record does not have the shape its kind requires.
    #[error("malformed history record {record_id}: {reason}")]
    MalformedRecord { record_id: i64, reason: String },

    /// A cached embedding does not match the active model's output width.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding model failed to produce vectors.
    #[error("embedding provider failure: {0}")]
    EmbeddingProvider(String),

    /// The persistence collaborator could not serve the request.
    #[error("store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Similarity inputs must be rank 1 or rank 2 with matching widths.
    #[error("unsupported similarity input shape: {0}")]
    Shape(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GraphError {
    /// Whether the pipeline recovers from this error locally instead of failing the build.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GraphError::MalformedRecord { .. } | GraphError::DimensionMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_variants() {
        assert!(GraphError::MalformedRecord {
            record_id: 1,
            reason: "x".into()
        }
        .is_recoverable());
        assert!(GraphError::DimensionMismatch {
            expected: 384,
            actual: 3
        }
        .is_recoverable());
        assert!(!GraphError::EmbeddingProvider("boom".into()).is_recoverable());
    }
}

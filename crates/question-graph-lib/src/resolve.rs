//! Make sure every question carries a vector from the active model before clustering.
//!
//! A cached vector is reused only when its width equals `Embedder::dimension()`
//! and all components are finite. Anything else is regenerated from the
//! question text. All regenerations go to the model as a single batch.

use serde::Serialize;
use tracing::debug;

use crate::embed::Embedder;
use crate::error::{GraphError, Result};
use crate::model::question::QuestionNode;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolveStats {
    /// Cached vectors used as-is.
    pub reused: usize,
    /// Vectors computed by the model (missing + rejected).
    pub regenerated: usize,
    /// Cached vectors rejected for width or non-finite values.
    pub rejected: usize,
}

/// Check a cached vector against the model's output width.
///
/// # Errors
///
/// `GraphError::DimensionMismatch` for a wrong width, or for a vector with
/// NaN/infinite components (reported with the expected width as `actual`).
pub fn validate_cached(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(GraphError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(GraphError::DimensionMismatch {
            expected,
            actual: expected,
        });
    }
    Ok(())
}

/// Fill in `embedding` for every node, reusing valid cached vectors.
///
/// # Errors
///
/// Propagates any model failure; the caller must not build a partial graph.
pub fn resolve_embeddings(nodes: &mut [QuestionNode], embedder: &dyn Embedder) -> Result<ResolveStats> {
    let expected = embedder.dimension();
    let mut stats = ResolveStats::default();
    let mut pending: Vec<usize> = Vec::new();

    for (i, node) in nodes.iter_mut().enumerate() {
        match node.embedding.as_deref().map(|v| validate_cached(v, expected)) {
            Some(Ok(())) => stats.reused += 1,
            Some(Err(err)) => {
                debug!(question = %node.id, error = %err, "discarding cached embedding");
                stats.rejected += 1;
                node.embedding = None;
                pending.push(i);
            }
            None => pending.push(i),
        }
    }

    if pending.is_empty() {
        return Ok(stats);
    }

    let texts: Vec<String> = pending.iter().map(|&i| nodes[i].question.clone()).collect();
    let vectors = embedder.embed_batch(&texts)?;
    if vectors.len() != pending.len() {
        return Err(GraphError::EmbeddingProvider(format!(
            "{} returned {} vectors for {} texts",
            embedder.model_name(),
            vectors.len(),
            pending.len()
        )));
    }

    for (i, vector) in pending.into_iter().zip(vectors) {
        if vector.len() != expected {
            return Err(GraphError::EmbeddingProvider(format!(
                "{} produced a {}-wide vector, expected {}",
                embedder.model_name(),
                vector.len(),
                expected
            )));
        }
        nodes[i].embedding = Some(vector);
        stats.regenerated += 1;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node(id: &str, question: &str, emb: Option<Vec<f32>>) -> QuestionNode {
        QuestionNode {
            id: id.into(),
            question: question.into(),
            answer: String::new(),
            answer_summary: None,
            category: "c".into(),
            timestamp: Utc::now(),
            summary_id: 1,
            history_id: 1,
            embedding: emb,
        }
    }

    struct CountingEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn model_name(&self) -> &str {
            "counting"
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(GraphError::EmbeddingProvider("model offline".into()))
        }
        fn dimension(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn valid_cache_is_reused_without_inference() {
        let e = CountingEmbedder {
            inner: HashEmbedder::new(4),
            calls: AtomicUsize::new(0),
        };
        let mut nodes = vec![node("a", "q", Some(vec![0.1, 0.2, 0.3, 0.4]))];
        let stats = resolve_embeddings(&mut nodes, &e).unwrap();
        assert_eq!(stats.reused, 1);
        assert_eq!(e.calls.load(Ordering::SeqCst), 0);
        assert_eq!(nodes[0].embedding.as_deref(), Some(&[0.1, 0.2, 0.3, 0.4][..]));
    }

    #[test]
    fn wrong_width_is_regenerated_from_question_text() {
        let e = HashEmbedder::new(4);
        let mut nodes = vec![
            node("a", "what is it?", Some(vec![1.0, 2.0])),
            node("b", "why?", None),
            node("c", "how?", Some(vec![f32::NAN, 0.0, 0.0, 0.0])),
        ];
        let stats = resolve_embeddings(&mut nodes, &e).unwrap();
        assert_eq!(
            stats,
            ResolveStats {
                reused: 0,
                regenerated: 3,
                rejected: 2
            }
        );
        assert_eq!(nodes[0].embedding, Some(e.embed("what is it?").unwrap()));
        assert!(nodes.iter().all(|n| n.embedding.as_ref().map(Vec::len) == Some(4)));
    }

    #[test]
    fn provider_failure_is_fatal() {
        let mut nodes = vec![node("a", "q", None)];
        let err = resolve_embeddings(&mut nodes, &FailingEmbedder).unwrap_err();
        assert!(matches!(err, GraphError::EmbeddingProvider(_)));
    }

    #[test]
    fn validate_cached_reports_widths() {
        match validate_cached(&[1.0, 2.0], 384) {
            Err(GraphError::DimensionMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (384, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

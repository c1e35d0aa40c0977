/*
Embedding providers.

- `Embedder` is the seam the rest of the crate depends on: text -> fixed-length
  vector, deterministic for a given model version, plus the output width used
  to validate cached vectors.
- `MiniLmEmbedder` wraps the `rust_embed` worker pool (MiniLM, 384 dims). Inference
  runs on the pool's own CPU workers, not on the calling thread.
- `HashEmbedder` produces deterministic pseudo-random vectors from a hash of the
  text. It is always available so tests and downstream crates can build graphs
  without model assets.

`default_embedder` selects the real model unless the crate is compiled for
tests or with the `fake-embed` feature. The real model is constructed at most
once per process; concurrent first calls block on the same initialisation.
*/

use std::sync::Arc;

use crate::error::Result;

/// Text -> vector model used by the resolver.
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order. The default calls `embed` per item.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Output width of every vector this model produces.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Output width of the MiniLM sentence model.
pub const MINILM_DIM: usize = 384;

#[cfg(not(any(test, feature = "fake-embed")))]
mod real {
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use once_cell::sync::OnceCell;
    use rust_embed::pool::{EmbeddingPool, ModelType, PoolConfig};
    use tracing::info;

    use super::{Embedder, MINILM_DIM};
    use crate::error::{GraphError, Result};

    /// Texts per pool call.
    const BATCH_CHUNK: usize = 32;

    static SHARED: OnceCell<Arc<MiniLmEmbedder>> = OnceCell::new();

    /// MiniLM sentence embeddings through the `rust_embed` worker pool.
    pub struct MiniLmEmbedder {
        /// `None` once the pool has been shut down.
        pool: Mutex<Option<EmbeddingPool>>,
    }

    impl MiniLmEmbedder {
        /// Start a pool with `workers` CPU workers and `cache_size` cached entries per worker.
        pub fn new(workers: usize, cache_size: usize) -> Result<Self> {
            let start = Instant::now();
            let config = PoolConfig {
                cpu_workers: workers,
                gpu_workers: 0,
                model: ModelType::MiniLM,
                cache_size_per_worker: cache_size,
                routing_config: None,
            };
            let pool = EmbeddingPool::new(config)
                .map_err(|e| GraphError::EmbeddingProvider(e.to_string()))?;
            info!(
                workers,
                elapsed = ?start.elapsed(),
                "embedding pool initialized"
            );
            Ok(Self {
                pool: Mutex::new(Some(pool)),
            })
        }

        /// Process-wide instance, created on first use.
        pub fn shared(workers: usize, cache_size: usize) -> Result<Arc<MiniLmEmbedder>> {
            SHARED
                .get_or_try_init(|| MiniLmEmbedder::new(workers, cache_size).map(Arc::new))
                .cloned()
        }

        /// Stop the pool's workers. Later embed calls fail with `EmbeddingProvider`.
        pub fn shutdown(&self) -> Result<()> {
            let mut guard = self
                .pool
                .lock()
                .map_err(|_| GraphError::EmbeddingProvider("embedding pool lock poisoned".into()))?;
            if let Some(pool) = guard.take() {
                pool.shutdown()
                    .map_err(|e| GraphError::EmbeddingProvider(e.to_string()))?;
                info!("embedding pool shut down");
            }
            Ok(())
        }

        fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let guard = self
                .pool
                .lock()
                .map_err(|_| GraphError::EmbeddingProvider("embedding pool lock poisoned".into()))?;
            let pool = guard
                .as_ref()
                .ok_or_else(|| GraphError::EmbeddingProvider("embedding pool is shut down".into()))?;
            let expected = texts.len();
            let out: Vec<Vec<f32>> = pool
                .embed_batch(texts)
                .map_err(|e| GraphError::EmbeddingProvider(e.to_string()))?
                .into_iter()
                .map(|arr| arr.to_vec())
                .collect();
            if out.len() != expected {
                return Err(GraphError::EmbeddingProvider(format!(
                    "pool returned {} vectors for {} texts",
                    out.len(),
                    expected
                )));
            }
            Ok(out)
        }
    }

    /// Shut down the process-wide pool, if one was started.
    pub fn shutdown() -> Result<()> {
        match SHARED.get() {
            Some(model) => model.shutdown(),
            None => Ok(()),
        }
    }

    impl Embedder for MiniLmEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.run(vec![text.to_string()])?
                .pop()
                .ok_or_else(|| GraphError::EmbeddingProvider("empty embedding result".into()))
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(BATCH_CHUNK) {
                out.extend(self.run(chunk.to_vec())?);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            MINILM_DIM
        }

        fn model_name(&self) -> &str {
            "all-MiniLM-L6-v2"
        }
    }
}

mod hash {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::Embedder;
    use crate::error::Result;

    /// Deterministic embedder: each component is a hash of (text, index) mapped into [-1, 1].
    ///
    /// Identical texts get identical vectors; different texts are close to orthogonal
    /// for realistic dimensions.
    #[derive(Debug, Clone)]
    pub struct HashEmbedder {
        dimension: usize,
    }

    impl HashEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self { dimension }
        }
    }

    impl Default for HashEmbedder {
        fn default() -> Self {
            Self::new(super::MINILM_DIM)
        }
    }

    impl Embedder for HashEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut out = Vec::with_capacity(self.dimension);
            for i in 0..self.dimension {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                let v = (hasher.finish() as f64) / (u64::MAX as f64);
                out.push((v * 2.0 - 1.0) as f32);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "hash"
        }
    }
}

pub use hash::HashEmbedder;

#[cfg(not(any(test, feature = "fake-embed")))]
pub use real::{shutdown, MiniLmEmbedder};

/// Nothing to release for the hash embedder.
#[cfg(any(test, feature = "fake-embed"))]
pub fn shutdown() -> Result<()> {
    Ok(())
}

/// The process embedder: MiniLM in normal builds, the hash embedder under
/// `cfg(test)` or `fake-embed`.
#[cfg(not(any(test, feature = "fake-embed")))]
pub fn default_embedder(workers: usize, cache_size: usize) -> Result<Arc<dyn Embedder>> {
    let model: Arc<dyn Embedder> = MiniLmEmbedder::shared(workers, cache_size)?;
    Ok(model)
}

/// The process embedder: MiniLM in normal builds, the hash embedder under
/// `cfg(test)` or `fake-embed`.
#[cfg(any(test, feature = "fake-embed"))]
pub fn default_embedder(_workers: usize, _cache_size: usize) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(HashEmbedder::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedder_is_deterministic() {
        let e = HashEmbedder::new(16);
        let a = e.embed("what is the main claim?").unwrap();
        let b = e.embed("what is the main claim?").unwrap();
        let c = e.embed("who funded the study?").unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn default_batch_preserves_order() {
        let e = HashEmbedder::new(8);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = e.embed_batch(&texts).unwrap();
        assert_eq!(batch[0], e.embed("a").unwrap());
        assert_eq!(batch[1], e.embed("b").unwrap());
    }

    #[test]
    fn default_embedder_under_test_is_hash() {
        let e = default_embedder(1, 0).unwrap();
        assert_eq!(e.model_name(), "hash");
        assert_eq!(e.dimension(), MINILM_DIM);
    }

    #[test]
    fn shutdown_is_idempotent_and_leaves_hash_embedder_usable() {
        let e = default_embedder(1, 0).unwrap();
        shutdown().unwrap();
        shutdown().unwrap();
        assert_eq!(e.embed("still works").unwrap().len(), MINILM_DIM);
    }
}

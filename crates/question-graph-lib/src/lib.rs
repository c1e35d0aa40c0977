//! Library entry point for the question similarity graph.
//!
//! A user's Q&A history against document summaries is normalized into
//! questions, embedded, grouped by cosine similarity and assembled into a
//! summary -> category -> question graph in which near-duplicate questions
//! share one node. The whole graph is recomputed on every call; nothing
//! derived is cached.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use question_graph::{embed, GraphBuilder, GraphConfig, JsonStore};
//!
//! # fn main() -> question_graph::Result<()> {
//! let store = Arc::new(JsonStore::open(Path::new("store.json"))?);
//! let embedder = embed::default_embedder(4, 0)?;
//! let builder = GraphBuilder::new(store, embedder, GraphConfig::default())?;
//! let graph = builder.build(1)?;
//! println!("{} nodes, {} edges", graph.nodes.len(), graph.edges.len());
//! # Ok(())
//! # }
//! ```
//
// Public modules
pub mod cluster;
pub mod config;
pub mod embed;
pub mod error;
pub mod graph;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod resolve;
pub mod similarity;
pub mod store;
pub mod utils;

// Re‑export primary types for ergonomic use.
pub use cluster::ClusterGroup;
pub use config::GraphConfig;
pub use embed::{Embedder, HashEmbedder};
pub use error::{GraphError, Result};
pub use graph::{EdgeRelation, GraphEdge, GraphNode, GraphStats, SimilarityGraph};
pub use model::{
    history::{HistoryRecord, RecordKind, StoredHistoryRecord},
    question::QuestionNode,
    summary::DocumentSummary,
};
pub use pipeline::{build_similarity_graph, ClusterReport, GraphBuilder};
pub use store::{HistoryStore, JsonStore, MemoryStore, StoreSnapshot};

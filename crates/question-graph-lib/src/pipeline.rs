//! End-to-end build: store -> normalize -> resolve -> cluster -> assemble.
//!
//! All derived state is local to one call. The only shared piece is the
//! embedder, which is passed in and must tolerate concurrent calls.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::cluster::{cluster_questions, ClusterGroup};
use crate::config::GraphConfig;
use crate::embed::Embedder;
use crate::error::Result;
use crate::graph::{assemble_graph, SimilarityGraph};
use crate::model::question::QuestionNode;
use crate::model::summary::DocumentSummary;
use crate::normalize::{normalize_history, NormalizeReport, SkippedRecord};
use crate::resolve::{resolve_embeddings, ResolveStats};
use crate::store::HistoryStore;

/// Questions of one user together with their grouping.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub summaries: Vec<DocumentSummary>,
    /// Every question; `groups` index into this list.
    pub questions: Vec<QuestionNode>,
    pub groups: Vec<ClusterGroup>,
    pub resolve: ResolveStats,
    pub skipped: Vec<SkippedRecord>,
}

/// Holds the collaborators for repeated builds.
#[derive(Clone)]
pub struct GraphBuilder {
    store: Arc<dyn HistoryStore>,
    embedder: Arc<dyn Embedder>,
    config: GraphConfig,
}

impl GraphBuilder {
    /// # Errors
    ///
    /// `GraphError::Config` when `config` fails validation.
    pub fn new(
        store: Arc<dyn HistoryStore>,
        embedder: Arc<dyn Embedder>,
        config: GraphConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Normalized questions per summary, without embeddings resolved.
    pub fn normalize(&self, user_id: i64) -> Result<(Vec<DocumentSummary>, NormalizeReport)> {
        let summaries = self.store.summaries_for_user(user_id)?;
        let rows = self.store.history_for_user(user_id)?;
        let report = normalize_history(&summaries, rows, &self.config);
        Ok((summaries, report))
    }

    /// Normalize, resolve embeddings and cluster.
    pub fn clusters(&self, user_id: i64) -> Result<ClusterReport> {
        let (summaries, report) = self.normalize(user_id)?;
        let skipped = report.skipped.clone();
        let mut questions = report.into_questions();

        let start = Instant::now();
        let resolve = resolve_embeddings(&mut questions, self.embedder.as_ref())?;
        debug!(
            reused = resolve.reused,
            regenerated = resolve.regenerated,
            rejected = resolve.rejected,
            elapsed = ?start.elapsed(),
            "resolved embeddings"
        );

        let groups = cluster_questions(&questions, self.config.similarity_threshold)?;
        Ok(ClusterReport {
            summaries,
            questions,
            groups,
            resolve,
            skipped,
        })
    }

    /// Build the similarity graph for `user_id`.
    ///
    /// # Errors
    ///
    /// Store failures and embedding failures. Malformed records are skipped, not
    /// reported as errors.
    pub fn build(&self, user_id: i64) -> Result<SimilarityGraph> {
        let span = info_span!("similarity_graph", user_id);
        let _enter = span.enter();
        let start = Instant::now();

        let report = self.clusters(user_id)?;
        let graph = assemble_graph(&report.summaries, &report.questions, &report.groups);

        info!(
            summaries = graph.stats.summaries,
            questions = graph.stats.questions,
            groups = graph.stats.groups,
            merged = graph.stats.merged_questions,
            skipped = report.skipped.len(),
            elapsed = ?start.elapsed(),
            "built similarity graph"
        );
        Ok(graph)
    }
}

/// One-shot build without holding a `GraphBuilder`.
pub fn build_similarity_graph(
    store: Arc<dyn HistoryStore>,
    embedder: Arc<dyn Embedder>,
    user_id: i64,
    config: &GraphConfig,
) -> Result<SimilarityGraph> {
    GraphBuilder::new(store, embedder, config.clone())?.build(user_id)
}

//! Graph assembly: summaries, categories and (possibly merged) questions.
//!
//! Edge direction is always parent -> child: parent summary -> summary ->
//! category -> question/group. Clustered groups replace their members, so
//! several category edges can collapse onto one group node; the final pass in
//! [`finalize_edges`] removes those duplicates and any self-loops.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::ClusterGroup;
use crate::model::question::QuestionNode;
use crate::model::summary::DocumentSummary;
use crate::normalize::group_by_category;

pub mod node;

pub use node::{CategoryNode, GraphNode, QuestionDetail, QuestionGroupNode, SummaryNode};

/// Relation carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRelation {
    ParentSummary,
    SummaryCategory,
    CategoryQuestion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: EdgeRelation,
    pub directed: bool,
}

impl GraphEdge {
    fn directed(source: String, target: String, relation: EdgeRelation) -> Self {
        Self {
            source,
            target,
            relation,
            directed: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub summaries: usize,
    pub categories: usize,
    /// Original questions before merging.
    pub questions: usize,
    /// Group nodes with more than one member.
    pub groups: usize,
    /// Questions absorbed into a group (members beyond each representative).
    pub merged_questions: usize,
    pub edges: usize,
}

/// Output of one build: everything the front end needs to draw the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub stats: GraphStats,
}

pub fn summary_node_id(summary_id: i64) -> String {
    format!("summary-{summary_id}")
}

pub fn category_node_id(summary_id: i64, category: &str) -> String {
    format!("category-{summary_id}-{category}")
}

pub fn group_node_id(representative: &QuestionNode) -> String {
    format!("group-{}", representative.id)
}

/// Drop self-loops and repeated `(source, target, relation)` triples, keeping
/// the first occurrence of each.
pub fn finalize_edges(edges: Vec<GraphEdge>) -> Vec<GraphEdge> {
    let mut seen: HashSet<(String, String, EdgeRelation)> = HashSet::new();
    edges
        .into_iter()
        .filter(|e| e.source != e.target)
        .filter(|e| seen.insert((e.source.clone(), e.target.clone(), e.relation)))
        .collect()
}

/// Build the graph for one user.
///
/// # Arguments
///
/// * `summaries` - the user's summaries, in display order
/// * `questions` - every question of the user (the slice the groups index into)
/// * `groups` - a partition of `questions` produced by the clusterer
pub fn assemble_graph(
    summaries: &[DocumentSummary],
    questions: &[QuestionNode],
    groups: &[ClusterGroup],
) -> SimilarityGraph {
    let known: HashSet<i64> = summaries.iter().map(|s| s.id).collect();
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut edges: Vec<GraphEdge> = Vec::new();

    for s in summaries {
        nodes.push(GraphNode::Summary(SummaryNode::from_summary(s)));
        if let Some(parent) = s.parent_summary_id {
            if known.contains(&parent) {
                edges.push(GraphEdge::directed(
                    summary_node_id(parent),
                    summary_node_id(s.id),
                    EdgeRelation::ParentSummary,
                ));
            } else {
                debug!(summary = s.id, parent, "parent summary not in result set");
            }
        }
    }

    // Categories per summary, in first-seen order.
    let mut category_count = 0;
    for s in summaries {
        let own: Vec<&QuestionNode> = questions.iter().filter(|q| q.summary_id == s.id).collect();
        for (category, _) in group_by_category(&own) {
            let id = category_node_id(s.id, &category);
            nodes.push(GraphNode::Category(CategoryNode {
                id: id.clone(),
                label: category.clone(),
                summary_id: s.id,
                category,
            }));
            edges.push(GraphEdge::directed(
                summary_node_id(s.id),
                id,
                EdgeRelation::SummaryCategory,
            ));
            category_count += 1;
        }
    }

    // Each question index -> the node id it is displayed as.
    let mut display_id: HashMap<usize, String> = HashMap::new();
    let mut group_count = 0;
    let mut merged = 0;
    for group in groups {
        if group.is_empty() {
            continue;
        }
        let rep = &questions[group.representative()];
        if group.is_singleton() {
            nodes.push(GraphNode::Question(QuestionDetail::from_question(rep, None)));
            display_id.insert(group.representative(), rep.id.clone());
            continue;
        }
        let id = group_node_id(rep);
        let members: Vec<QuestionDetail> = group
            .members
            .iter()
            .zip(&group.similarities)
            .map(|(&i, sim)| QuestionDetail::from_question(&questions[i], *sim))
            .collect();
        for &i in &group.members {
            display_id.insert(i, id.clone());
        }
        group_count += 1;
        merged += group.len() - 1;
        nodes.push(GraphNode::QuestionGroup(QuestionGroupNode {
            label: format!("{} ({} similar)", rep.question, group.len()),
            id,
            member_count: group.len(),
            representative_id: rep.id.clone(),
            member_ids: members.iter().map(|m| m.id.clone()).collect(),
            members,
        }));
    }

    for (i, q) in questions.iter().enumerate() {
        if !known.contains(&q.summary_id) {
            continue;
        }
        let Some(target) = display_id.get(&i) else {
            continue;
        };
        edges.push(GraphEdge::directed(
            category_node_id(q.summary_id, &q.category),
            target.clone(),
            EdgeRelation::CategoryQuestion,
        ));
    }

    let edges = finalize_edges(edges);
    let stats = GraphStats {
        summaries: summaries.len(),
        categories: category_count,
        questions: questions.len(),
        groups: group_count,
        merged_questions: merged,
        edges: edges.len(),
    };

    SimilarityGraph {
        nodes,
        edges,
        stats,
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::question::QuestionNode;
use crate::model::summary::DocumentSummary;

/// One drawable node; serialized with a `type` tag per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphNode {
    Summary(SummaryNode),
    Category(CategoryNode),
    Question(QuestionDetail),
    QuestionGroup(QuestionGroupNode),
}

impl GraphNode {
    pub fn id(&self) -> &str {
        match self {
            GraphNode::Summary(n) => &n.id,
            GraphNode::Category(n) => &n.id,
            GraphNode::Question(n) => &n.id,
            GraphNode::QuestionGroup(n) => &n.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            GraphNode::Summary(n) => &n.label,
            GraphNode::Category(n) => &n.label,
            GraphNode::Question(n) => &n.label,
            GraphNode::QuestionGroup(n) => &n.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryNode {
    pub id: String,
    pub label: String,
    pub summary_id: i64,
    pub summary: String,
    pub parent_summary_id: Option<i64>,
    pub team_id: Option<i64>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SummaryNode {
    pub fn from_summary(s: &DocumentSummary) -> Self {
        Self {
            id: super::summary_node_id(s.id),
            label: s.label(),
            summary_id: s.id,
            summary: s.summary.clone(),
            parent_summary_id: s.parent_summary_id,
            team_id: s.team_id,
            tags: s.tags.clone(),
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: String,
    pub label: String,
    pub summary_id: i64,
    pub category: String,
}

/// Display details of one original question. Used both as a standalone node
/// and as a member entry inside a group node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDetail {
    pub id: String,
    pub label: String,
    pub summary_id: i64,
    pub history_id: i64,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_summary: Option<String>,
    pub category: String,
    pub created_at: DateTime<Utc>,
    /// Similarity to the group representative; absent for standalone nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl QuestionDetail {
    pub fn from_question(q: &QuestionNode, similarity: Option<f32>) -> Self {
        Self {
            id: q.id.clone(),
            label: q.question.clone(),
            summary_id: q.summary_id,
            history_id: q.history_id,
            answer: q.answer.clone(),
            answer_summary: q.answer_summary.clone(),
            category: q.category.clone(),
            created_at: q.timestamp,
            similarity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGroupNode {
    pub id: String,
    pub label: String,
    pub member_count: usize,
    pub representative_id: String,
    pub member_ids: Vec<String>,
    pub members: Vec<QuestionDetail>,
}

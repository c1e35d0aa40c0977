// Plain Vec<f32> for the embedding; it is filled in by the resolver before clustering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One question extracted from a history record. Derived on every build, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionNode {
    /// Stable id: `question-{history_id}-{ordinal}`.
    pub id: String,
    /// Question text, also used as the display label.
    pub question: String,
    /// Answer text; empty when the question was never answered.
    pub answer: String,
    /// Short AI summary of the answer, when one was stored.
    pub answer_summary: Option<String>,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    pub summary_id: i64,
    /// History record the question came from (cached embedding lookup).
    pub history_id: i64,
    /// Cached vector from the record, replaced by the resolver when invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl QuestionNode {
    pub fn make_id(history_id: i64, ordinal: usize) -> String {
        format!("question-{history_id}-{ordinal}")
    }
}

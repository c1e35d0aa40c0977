use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::min_timestamp;

/// One processed document (or document set) owned by a user.
///
/// Summaries form a forest through `parent_summary_id`; follow-up summaries
/// point at the summary they were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub team_id: Option<i64>,
    /// Original filename or user-edited title.
    #[serde(default, alias = "title")]
    pub filename: String,
    /// Free-text summary produced upstream.
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub parent_summary_id: Option<i64>,
    #[serde(
        default = "min_timestamp",
        deserialize_with = "super::lenient_timestamp::required"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DocumentSummary {
    /// Display label: the filename when present, otherwise a numbered fallback.
    pub fn label(&self) -> String {
        let name = self.filename.trim();
        if name.is_empty() {
            format!("Summary {}", self.id)
        } else {
            name.to_string()
        }
    }
}

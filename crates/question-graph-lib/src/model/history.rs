// Chat history attached to a document summary.
//
// The store hands out loosely-typed rows (`StoredHistoryRecord`); legacy rows keep
// their transcript as arbitrary JSON. `HistoryRecord::try_from` is the single place
// where a row is resolved into one of the two typed shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{min_timestamp, parse_timestamp_str};
use crate::error::GraphError;

/// Storage discriminator for a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// One question, one answer and a derived short summary.
    #[serde(alias = "question_summary")]
    Structured,
    /// Legacy freeform chat transcript.
    #[serde(alias = "chat", alias = "legacy")]
    Transcript,
}

/// A history row exactly as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredHistoryRecord {
    pub id: i64,
    pub summary_id: i64,
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// AI-generated short summary of the answer.
    #[serde(
        default,
        alias = "ai_answer_summary",
        skip_serializing_if = "Option::is_none"
    )]
    pub short_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Transcript turns for legacy rows: normally a JSON list, sometimes a
    /// JSON-encoded string of one.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(
        default,
        deserialize_with = "super::lenient_timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredHistoryRecord {
    pub fn created_at_or_min(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or_else(min_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRecord {
    pub id: i64,
    pub summary_id: i64,
    pub question: String,
    pub answer: String,
    pub short_summary: Option<String>,
    pub category: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRecord {
    pub id: i64,
    pub summary_id: i64,
    pub turns: Vec<Turn>,
    /// One vector covering the whole transcript, if one was stored.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
    Other(String),
}

impl Sender {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Sender::User,
            "ai" | "assistant" | "bot" => Sender::Assistant,
            other => Sender::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
    pub category: Option<String>,
    /// `Some(MIN_UTC)` when a timestamp was present but unreadable.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    fn from_value(value: &Value) -> Option<Turn> {
        let obj = value.as_object()?;
        let sender = obj
            .get("sender")
            .or_else(|| obj.get("role"))
            .and_then(Value::as_str)
            .map(Sender::parse)?;
        let text = obj
            .get("text")
            .or_else(|| obj.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let category = obj
            .get("category")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let timestamp = obj
            .get("timestamp")
            .or_else(|| obj.get("created_at"))
            .and_then(parse_timestamp);
        Some(Turn {
            sender,
            text,
            category,
            timestamp,
        })
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(parse_timestamp_str(s).unwrap_or_else(min_timestamp)),
        Value::Number(n) => Some(
            n.as_i64()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .unwrap_or_else(min_timestamp),
        ),
        _ => Some(min_timestamp()),
    }
}

/// A history row resolved into its typed shape.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryRecord {
    Structured(StructuredRecord),
    Transcript(TranscriptRecord),
}

impl HistoryRecord {
    pub fn id(&self) -> i64 {
        match self {
            HistoryRecord::Structured(r) => r.id,
            HistoryRecord::Transcript(r) => r.id,
        }
    }

    pub fn summary_id(&self) -> i64 {
        match self {
            HistoryRecord::Structured(r) => r.summary_id,
            HistoryRecord::Transcript(r) => r.summary_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            HistoryRecord::Structured(r) => r.created_at,
            HistoryRecord::Transcript(r) => r.created_at,
        }
    }
}

impl TryFrom<StoredHistoryRecord> for HistoryRecord {
    type Error = GraphError;

    fn try_from(row: StoredHistoryRecord) -> Result<Self, Self::Error> {
        let created_at = row.created_at_or_min();
        let malformed = |reason: &str| GraphError::MalformedRecord {
            record_id: row.id,
            reason: reason.to_string(),
        };

        match row.kind {
            RecordKind::Structured => {
                let question = row
                    .question
                    .as_deref()
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| malformed("structured record has no question text"))?
                    .to_string();
                Ok(HistoryRecord::Structured(StructuredRecord {
                    id: row.id,
                    summary_id: row.summary_id,
                    question,
                    answer: row.answer.unwrap_or_default(),
                    short_summary: row.short_summary,
                    category: row.category,
                    embedding: row.embedding,
                    created_at,
                }))
            }
            RecordKind::Transcript => {
                let items = transcript_items(&row.content)
                    .ok_or_else(|| malformed("transcript content is not a list"))?;
                let turns = items
                    .iter()
                    .map(Turn::from_value)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| malformed("transcript turn is not an object with a sender"))?;
                Ok(HistoryRecord::Transcript(TranscriptRecord {
                    id: row.id,
                    summary_id: row.summary_id,
                    turns,
                    embedding: row.embedding,
                    created_at,
                }))
            }
        }
    }
}

/// Transcript turns are a JSON list, or a string holding a JSON-encoded list.
fn transcript_items(content: &Value) -> Option<Vec<Value>> {
    match content {
        Value::Array(items) => Some(items.clone()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

//! History normalization: stored rows -> `QuestionNode` candidates per summary.
//!
//! Rows are resolved into typed records once, here. A row that cannot be
//! resolved is skipped with a warning and listed in the report; it never fails
//! the build.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::model::history::{
    HistoryRecord, Sender, StoredHistoryRecord, StructuredRecord, TranscriptRecord, Turn,
};
use crate::model::question::QuestionNode;
use crate::model::summary::DocumentSummary;

/// Questions extracted for one summary, in record order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryQuestions {
    pub summary_id: i64,
    pub questions: Vec<QuestionNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub record_id: i64,
    pub reason: String,
}

/// Result of normalizing one user's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizeReport {
    /// One entry per summary, in the order summaries were given.
    pub per_summary: Vec<SummaryQuestions>,
    pub skipped: Vec<SkippedRecord>,
}

impl NormalizeReport {
    /// All questions, summary by summary.
    pub fn into_questions(self) -> Vec<QuestionNode> {
        self.per_summary
            .into_iter()
            .flat_map(|s| s.questions)
            .collect()
    }

    pub fn question_count(&self) -> usize {
        self.per_summary.iter().map(|s| s.questions.len()).sum()
    }
}

/// Fall back to `fallback` when `category` is missing or blank.
fn category_or(category: Option<&str>, fallback: &str) -> String {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn normalize_structured(rec: &StructuredRecord, config: &GraphConfig) -> QuestionNode {
    QuestionNode {
        id: QuestionNode::make_id(rec.id, 0),
        question: rec.question.clone(),
        answer: rec.answer.clone(),
        answer_summary: rec.short_summary.clone(),
        category: category_or(rec.category.as_deref(), &config.structured_category),
        timestamp: rec.created_at,
        summary_id: rec.summary_id,
        history_id: rec.id,
        embedding: rec.embedding.clone(),
    }
}

/// A user turn waiting for its answer.
struct PendingQuestion<'a> {
    turn: &'a Turn,
}

enum TranscriptState<'a> {
    AwaitingQuestion,
    AwaitingAnswer(PendingQuestion<'a>),
}

/// Pairs user turns with the assistant turn that immediately follows them.
struct TranscriptPairer<'a> {
    record: &'a TranscriptRecord,
    default_category: &'a str,
    state: TranscriptState<'a>,
    out: Vec<QuestionNode>,
}

impl<'a> TranscriptPairer<'a> {
    fn new(record: &'a TranscriptRecord, default_category: &'a str) -> Self {
        Self {
            record,
            default_category,
            state: TranscriptState::AwaitingQuestion,
            out: Vec::new(),
        }
    }

    fn emit(&mut self, pending: PendingQuestion<'a>, answer: &str) {
        let rec = self.record;
        let turn = pending.turn;
        self.out.push(QuestionNode {
            id: QuestionNode::make_id(rec.id, self.out.len()),
            question: turn.text.trim().to_string(),
            answer: answer.to_string(),
            answer_summary: None,
            category: category_or(turn.category.as_deref(), self.default_category),
            timestamp: turn.timestamp.unwrap_or(rec.created_at),
            summary_id: rec.summary_id,
            history_id: rec.id,
            embedding: rec.embedding.clone(),
        });
    }

    fn feed(&mut self, turn: &'a Turn) {
        let state = std::mem::replace(&mut self.state, TranscriptState::AwaitingQuestion);
        self.state = match (state, &turn.sender) {
            (state, Sender::User) if turn.text.trim().is_empty() => {
                debug!(record = self.record.id, "skipping empty user turn");
                state
            }
            (TranscriptState::AwaitingAnswer(pending), Sender::User) => {
                self.emit(pending, "");
                TranscriptState::AwaitingAnswer(PendingQuestion { turn })
            }
            (TranscriptState::AwaitingQuestion, Sender::User) => {
                TranscriptState::AwaitingAnswer(PendingQuestion { turn })
            }
            (TranscriptState::AwaitingAnswer(pending), Sender::Assistant) => {
                self.emit(pending, &turn.text);
                TranscriptState::AwaitingQuestion
            }
            (TranscriptState::AwaitingQuestion, Sender::Assistant) => {
                TranscriptState::AwaitingQuestion
            }
            (state, Sender::Other(sender)) => {
                debug!(record = self.record.id, sender = %sender, "skipping turn from unknown sender");
                state
            }
        };
    }

    fn finish(mut self) -> Vec<QuestionNode> {
        let state = std::mem::replace(&mut self.state, TranscriptState::AwaitingQuestion);
        if let TranscriptState::AwaitingAnswer(pending) = state {
            self.emit(pending, "");
        }
        self.out
    }
}

/// Extract question/answer pairs from a transcript.
///
/// A user turn opens a question; an assistant turn directly after it answers it.
/// A user turn arriving while a question is still open closes the open one with
/// an empty answer, as does the end of the transcript.
pub fn normalize_transcript(rec: &TranscriptRecord, default_category: &str) -> Vec<QuestionNode> {
    let mut pairer = TranscriptPairer::new(rec, default_category);
    for turn in &rec.turns {
        pairer.feed(turn);
    }
    pairer.finish()
}

/// Questions contained in one typed record.
pub fn normalize_record(record: &HistoryRecord, config: &GraphConfig) -> Vec<QuestionNode> {
    match record {
        HistoryRecord::Structured(rec) => vec![normalize_structured(rec, config)],
        HistoryRecord::Transcript(rec) => normalize_transcript(rec, &config.default_category),
    }
}

/// Normalize every history row of a user into per-summary question lists.
///
/// Rows are processed in `(created_at, id)` order. Rows pointing at a summary
/// outside `summaries`, and rows that fail to resolve, are skipped.
pub fn normalize_history(
    summaries: &[DocumentSummary],
    mut rows: Vec<StoredHistoryRecord>,
    config: &GraphConfig,
) -> NormalizeReport {
    let owned: HashSet<i64> = summaries.iter().map(|s| s.id).collect();
    let mut by_summary: HashMap<i64, Vec<QuestionNode>> = HashMap::new();
    let mut skipped = Vec::new();

    rows.sort_by_key(|r| (r.created_at_or_min(), r.id));

    for row in rows {
        let record_id = row.id;
        if !owned.contains(&row.summary_id) {
            warn!(
                record = record_id,
                summary = row.summary_id,
                "history record references an unknown summary, skipping"
            );
            skipped.push(SkippedRecord {
                record_id,
                reason: format!("unknown summary {}", row.summary_id),
            });
            continue;
        }
        match HistoryRecord::try_from(row) {
            Ok(record) => {
                let questions = normalize_record(&record, config);
                by_summary
                    .entry(record.summary_id())
                    .or_default()
                    .extend(questions);
            }
            Err(err) => {
                debug_assert!(err.is_recoverable());
                warn!(record = record_id, error = %err, "skipping malformed history record");
                skipped.push(SkippedRecord {
                    record_id,
                    reason: err.to_string(),
                });
            }
        }
    }

    let per_summary = summaries
        .iter()
        .map(|s| SummaryQuestions {
            summary_id: s.id,
            questions: by_summary.remove(&s.id).unwrap_or_default(),
        })
        .collect();

    NormalizeReport {
        per_summary,
        skipped,
    }
}

/// Group questions by category, keeping first-seen category order and question
/// order within each category.
pub fn group_by_category<'a>(questions: &[&'a QuestionNode]) -> Vec<(String, Vec<&'a QuestionNode>)> {
    let mut groups: Vec<(String, Vec<&'a QuestionNode>)> = Vec::new();
    for &q in questions {
        match groups.iter_mut().find(|(c, _)| *c == q.category) {
            Some((_, members)) => members.push(q),
            None => groups.push((q.category.clone(), vec![q])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::history::RecordKind;
    use crate::model::min_timestamp;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn summary(id: i64) -> DocumentSummary {
        DocumentSummary {
            id,
            user_id: 1,
            team_id: None,
            filename: format!("doc{id}.pdf"),
            summary: String::new(),
            parent_summary_id: None,
            created_at: Utc.timestamp_opt(1_000, 0).unwrap(),
            tags: Vec::new(),
        }
    }

    fn transcript(id: i64, content: Value) -> StoredHistoryRecord {
        StoredHistoryRecord {
            id,
            summary_id: 1,
            kind: RecordKind::Transcript,
            question: None,
            answer: None,
            short_summary: None,
            category: None,
            content,
            embedding: None,
            created_at: Some(Utc.timestamp_opt(2_000 + id, 0).unwrap()),
        }
    }

    fn structured(id: i64, question: &str, category: Option<&str>) -> StoredHistoryRecord {
        StoredHistoryRecord {
            kind: RecordKind::Structured,
            question: Some(question.to_string()),
            answer: Some(format!("answer to {question}")),
            short_summary: Some("short".into()),
            category: category.map(str::to_string),
            ..transcript(id, Value::Null)
        }
    }

    fn pairs(report: &NormalizeReport) -> Vec<(String, String)> {
        report.per_summary[0]
            .questions
            .iter()
            .map(|q| (q.question.clone(), q.answer.clone()))
            .collect()
    }

    #[test]
    fn trailing_unanswered_question_is_emitted() {
        let rows = vec![transcript(
            1,
            json!([
                {"sender": "user", "text": "Q1"},
                {"sender": "ai", "text": "A1"},
                {"sender": "user", "text": "Q2"}
            ]),
        )];
        let report = normalize_history(&[summary(1)], rows, &GraphConfig::default());
        assert_eq!(
            pairs(&report),
            vec![("Q1".into(), "A1".into()), ("Q2".into(), String::new())]
        );
        let ids: Vec<&str> = report.per_summary[0].questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["question-1-0", "question-1-1"]);
    }

    #[test]
    fn consecutive_user_turns_close_the_open_question() {
        let rows = vec![transcript(
            1,
            json!([
                {"sender": "user", "text": "Q1"},
                {"sender": "user", "text": "Q2"},
                {"sender": "assistant", "text": "A2"},
                {"sender": "ai", "text": "stray"}
            ]),
        )];
        let report = normalize_history(&[summary(1)], rows, &GraphConfig::default());
        assert_eq!(
            pairs(&report),
            vec![("Q1".into(), String::new()), ("Q2".into(), "A2".into())]
        );
    }

    #[test]
    fn malformed_transcript_is_skipped() {
        let rows = vec![transcript(9, json!("not a list"))];
        let report = normalize_history(&[summary(1)], rows, &GraphConfig::default());
        assert_eq!(report.question_count(), 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].record_id, 9);
    }

    #[test]
    fn categories_and_timestamps_fall_back() {
        let rows = vec![
            transcript(
                1,
                json!([
                    {"sender": "user", "text": "Q1", "category": "research",
                     "timestamp": "2024-01-02T03:04:05Z"},
                    {"sender": "ai", "text": "A1"},
                    {"sender": "user", "text": "Q2"},
                    {"sender": "user", "text": "Q3", "timestamp": "garbage"}
                ]),
            ),
            structured(2, "S1", None),
        ];
        let report = normalize_history(&[summary(1)], rows, &GraphConfig::default());
        let qs = &report.per_summary[0].questions;
        assert_eq!(qs[0].category, "research");
        assert_eq!(qs[0].timestamp.timestamp(), 1_704_164_645);
        assert_eq!(qs[1].category, "uncategorized");
        assert_eq!(qs[1].timestamp, Utc.timestamp_opt(2_001, 0).unwrap());
        assert_eq!(qs[2].timestamp, min_timestamp());
        assert_eq!(qs[3].category, "question-summary");
        assert_eq!(qs[3].answer_summary.as_deref(), Some("short"));
        assert_eq!(qs[3].id, "question-2-0");
    }

    #[test]
    fn naive_turn_timestamp_keeps_its_time() {
        let rows = vec![transcript(
            1,
            json!([
                {"sender": "user", "text": "Q", "timestamp": "2024-02-01T00:00:00.123456"},
                {"sender": "ai", "text": "A"}
            ]),
        )];
        let report = normalize_history(&[summary(1)], rows, &GraphConfig::default());
        let q = &report.per_summary[0].questions[0];
        assert_ne!(q.timestamp, min_timestamp());
        assert_eq!(q.timestamp.timestamp(), 1_706_745_600);
    }

    #[test]
    fn aggregate_embedding_is_carried_to_every_pair() {
        let mut row = transcript(
            1,
            json!([
                {"sender": "user", "text": "Q1"},
                {"sender": "ai", "text": "A1"},
                {"sender": "user", "text": "Q2"}
            ]),
        );
        row.embedding = Some(vec![0.5, 0.5]);
        let report = normalize_history(&[summary(1)], vec![row], &GraphConfig::default());
        assert!(report.per_summary[0]
            .questions
            .iter()
            .all(|q| q.embedding.as_deref() == Some(&[0.5, 0.5][..])));
    }

    #[test]
    fn records_for_foreign_summaries_are_skipped() {
        let mut row = structured(3, "S", None);
        row.summary_id = 42;
        let report = normalize_history(&[summary(1)], vec![row], &GraphConfig::default());
        assert_eq!(report.question_count(), 0);
        assert_eq!(report.skipped[0].record_id, 3);
    }

    #[test]
    fn group_by_category_keeps_first_seen_order() {
        let rows = vec![
            structured(1, "a", Some("x")),
            structured(2, "b", Some("y")),
            structured(3, "c", Some("x")),
        ];
        let report = normalize_history(&[summary(1)], rows, &GraphConfig::default());
        let qs: Vec<&QuestionNode> = report.per_summary[0].questions.iter().collect();
        let grouped = group_by_category(&qs);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "x");
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[1].0, "y");
    }
}

//! Read access to persisted summaries and history rows.
//!
//! The relational store lives outside this crate; `HistoryStore` is the seam.
//! `MemoryStore` serves an in-memory snapshot and `JsonStore` persists that
//! snapshot as a single JSON document on disk.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::model::history::StoredHistoryRecord;
use crate::model::summary::DocumentSummary;

/// Persistence collaborator consumed by the graph builder.
pub trait HistoryStore: Send + Sync {
    /// Summaries owned by `user_id`, oldest first.
    fn summaries_for_user(&self, user_id: i64) -> Result<Vec<DocumentSummary>>;

    /// History rows attached to summaries owned by `user_id`, oldest first.
    fn history_for_user(&self, user_id: i64) -> Result<Vec<StoredHistoryRecord>>;
}

/// On-disk / in-memory interchange format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub summaries: Vec<DocumentSummary>,
    #[serde(default)]
    pub history: Vec<StoredHistoryRecord>,
}

impl StoreSnapshot {
    /// Distinct owners, ascending.
    pub fn user_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.summaries.iter().map(|s| s.user_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: StoreSnapshot,
}

impl MemoryStore {
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }
}

impl HistoryStore for MemoryStore {
    fn summaries_for_user(&self, user_id: i64) -> Result<Vec<DocumentSummary>> {
        let mut out: Vec<DocumentSummary> = self
            .snapshot
            .summaries
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.created_at, s.id));
        Ok(out)
    }

    fn history_for_user(&self, user_id: i64) -> Result<Vec<StoredHistoryRecord>> {
        let owned: std::collections::HashSet<i64> = self
            .snapshot
            .summaries
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id)
            .collect();
        let mut out: Vec<StoredHistoryRecord> = self
            .snapshot
            .history
            .iter()
            .filter(|h| owned.contains(&h.summary_id))
            .cloned()
            .collect();
        out.sort_by_key(|h| (h.created_at_or_min(), h.id));
        Ok(out)
    }
}

/// A `MemoryStore` loaded from (and savable to) a JSON file.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    /// Load the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// `GraphError::Store` naming the path, for IO failures and for JSON that is
    /// not a snapshot.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| store_error(path, e))?;
        let snapshot: StoreSnapshot =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| store_error(path, e))?;
        debug!(
            path = %path.display(),
            summaries = snapshot.summaries.len(),
            history = snapshot.history.len(),
            "loaded store snapshot"
        );
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryStore::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        self.inner.snapshot()
    }

    /// Write `snapshot` to `path` as JSON.
    pub fn save(snapshot: &StoreSnapshot, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| store_error(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), snapshot)
            .map_err(|e| store_error(path, e))
    }
}

fn store_error(path: &Path, err: impl std::fmt::Display) -> GraphError {
    GraphError::Store(format!("{}: {err}", path.display()))
}

impl HistoryStore for JsonStore {
    fn summaries_for_user(&self, user_id: i64) -> Result<Vec<DocumentSummary>> {
        self.inner.summaries_for_user(user_id)
    }

    fn history_for_user(&self, user_id: i64) -> Result<Vec<StoredHistoryRecord>> {
        self.inner.history_for_user(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::history::RecordKind;
    use chrono::{TimeZone, Utc};

    fn snapshot() -> StoreSnapshot {
        let summary = |id: i64, user_id: i64, ts: i64| DocumentSummary {
            id,
            user_id,
            team_id: None,
            filename: String::new(),
            summary: String::new(),
            parent_summary_id: None,
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
            tags: Vec::new(),
        };
        let row = |id: i64, summary_id: i64, ts: i64| StoredHistoryRecord {
            id,
            summary_id,
            kind: RecordKind::Structured,
            question: Some(format!("q{id}")),
            answer: None,
            short_summary: None,
            category: None,
            content: serde_json::Value::Null,
            embedding: None,
            created_at: Some(Utc.timestamp_opt(ts, 0).unwrap()),
        };
        StoreSnapshot {
            summaries: vec![summary(2, 7, 50), summary(1, 7, 10), summary(3, 8, 5)],
            history: vec![row(11, 1, 30), row(10, 2, 20), row(12, 3, 1)],
        }
    }

    #[test]
    fn filters_by_owner_and_orders_by_creation() {
        let store = MemoryStore::new(snapshot());
        let ids: Vec<i64> = store
            .summaries_for_user(7)
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
        let rows: Vec<i64> = store
            .history_for_user(7)
            .unwrap()
            .iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(rows, vec![10, 11]);
        assert_eq!(store.snapshot().user_ids(), vec![7, 8]);
    }

    #[test]
    fn unreadable_store_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = JsonStore::open(&missing).unwrap_err();
        assert!(matches!(&err, GraphError::Store(msg) if msg.contains("missing.json")));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, r#"{"summaries": 5}"#).unwrap();
        assert!(matches!(JsonStore::open(&garbage), Err(GraphError::Store(_))));
    }

    #[test]
    fn json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        JsonStore::save(&snapshot(), &path).unwrap();
        let store = JsonStore::open(&path).unwrap();
        assert_eq!(store.snapshot(), &snapshot());
        assert_eq!(store.history_for_user(8).unwrap().len(), 1);
    }
}

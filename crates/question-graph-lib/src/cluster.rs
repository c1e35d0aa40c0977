//! Greedy grouping of near-duplicate questions.
//!
//! Nodes are visited in timestamp order (stable for ties). The first unassigned
//! node seeds a group and becomes its representative; every later unassigned node
//! whose cosine similarity *to the representative* is at least the threshold
//! joins that group. Similarity between non-representative members is never
//! consulted, so the grouping is not transitive: two questions that are close to
//! each other but not to the earliest question of the group stay apart.
//!
//! Nodes without an embedding, or whose embedding width differs from the
//! dominant width, cannot be compared and come out as singleton groups.

use std::time::Instant;

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::question::QuestionNode;
use crate::similarity::{cosine_similarity_matrix, stack_rows};

/// Indices into the clustered node slice. `members[0]` is the representative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterGroup {
    pub members: Vec<usize>,
    /// Similarity of each member to the representative, parallel to `members`.
    /// `None` for nodes that could not be compared.
    pub similarities: Vec<Option<f32>>,
}

impl ClusterGroup {
    fn seed(index: usize, comparable: bool) -> Self {
        Self {
            members: vec![index],
            similarities: vec![comparable.then_some(1.0)],
        }
    }

    pub fn representative(&self) -> usize {
        self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Node indices sorted by timestamp ascending; ties keep input order.
pub fn timestamp_order(nodes: &[QuestionNode]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    // `sort_by_key` is stable.
    order.sort_by_key(|&i| nodes[i].timestamp);
    order
}

/// Partition `nodes` into groups using the greedy first-seed rule.
///
/// # Arguments
///
/// * `nodes` - all questions of one user, embeddings already resolved
/// * `threshold` - inclusive cosine similarity required to join a group
///
/// # Returns
///
/// Groups ordered by their representative's timestamp. Every node index appears
/// in exactly one group.
///
/// # Errors
///
/// Only if the comparable embeddings cannot be stacked, which the width filter
/// rules out.
pub fn cluster_questions(nodes: &[QuestionNode], threshold: f32) -> Result<Vec<ClusterGroup>> {
    let start = Instant::now();
    let order = timestamp_order(nodes);

    let width = order
        .iter()
        .find_map(|&i| nodes[i].embedding.as_ref().filter(|e| !e.is_empty()))
        .map(Vec::len);

    // Position of each node inside the similarity matrix, if it is comparable.
    let mut slot: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut rows: Vec<&[f32]> = Vec::new();
    for &i in &order {
        match (&nodes[i].embedding, width) {
            (Some(e), Some(w)) if e.len() == w => {
                slot[i] = Some(rows.len());
                rows.push(e.as_slice());
            }
            (Some(e), Some(w)) => {
                warn!(
                    question = %nodes[i].id,
                    width = e.len(),
                    expected = w,
                    "embedding width differs, question kept as singleton"
                );
            }
            _ => debug!(question = %nodes[i].id, "no embedding, question kept as singleton"),
        }
    }

    let sim: Array2<f32> = if rows.is_empty() {
        Array2::zeros((0, 0))
    } else {
        cosine_similarity_matrix(&stack_rows(&rows)?.view())
    };

    let mut assigned = vec![false; nodes.len()];
    let mut groups: Vec<ClusterGroup> = Vec::new();

    for (pos, &seed) in order.iter().enumerate() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;

        let Some(seed_slot) = slot[seed] else {
            groups.push(ClusterGroup::seed(seed, false));
            continue;
        };

        let mut group = ClusterGroup::seed(seed, true);
        for &candidate in &order[pos + 1..] {
            if assigned[candidate] {
                continue;
            }
            let Some(cand_slot) = slot[candidate] else {
                continue;
            };
            let score = sim[(seed_slot, cand_slot)];
            if score >= threshold {
                assigned[candidate] = true;
                group.members.push(candidate);
                group.similarities.push(Some(score));
            }
        }
        groups.push(group);
    }

    debug!(
        nodes = nodes.len(),
        groups = groups.len(),
        merged = groups.iter().filter(|g| !g.is_singleton()).count(),
        elapsed = ?start.elapsed(),
        "clustered questions"
    );
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn node(id: &str, ts: i64, emb: Option<Vec<f32>>) -> QuestionNode {
        QuestionNode {
            id: id.to_string(),
            question: id.to_string(),
            answer: String::new(),
            answer_summary: None,
            category: "c".to_string(),
            timestamp: at(ts),
            summary_id: 1,
            history_id: 1,
            embedding: emb,
        }
    }

    fn assert_partition(groups: &[ClusterGroup], n: usize) {
        let mut seen: Vec<usize> = groups.iter().flat_map(|g| g.members.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn identical_vectors_merge() {
        let nodes = vec![
            node("a", 10, Some(vec![1.0, 0.0])),
            node("b", 20, Some(vec![1.0, 0.0])),
        ];
        let groups = cluster_questions(&nodes, 0.85).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![0, 1]);
    }

    #[test]
    fn below_threshold_stays_apart() {
        // cos = 0.8
        let nodes = vec![
            node("a", 10, Some(vec![1.0, 0.0])),
            node("b", 20, Some(vec![0.8, 0.6])),
        ];
        let groups = cluster_questions(&nodes, 0.85).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(ClusterGroup::is_singleton));
    }

    #[test]
    fn earliest_node_is_representative_regardless_of_input_order() {
        let nodes = vec![
            node("late", 30, Some(vec![1.0, 0.0])),
            node("early", 10, Some(vec![1.0, 0.0])),
        ];
        let groups = cluster_questions(&nodes, 0.85).unwrap();
        assert_eq!(groups[0].representative(), 1);
        assert_eq!(groups[0].members, vec![1, 0]);
    }

    #[test]
    fn grouping_is_not_transitive() {
        // rep·b ≈ 0.866 and b·c ≈ 0.866 but rep·c = 0.5
        let s = 3.0_f32.sqrt() / 2.0;
        let nodes = vec![
            node("rep", 1, Some(vec![1.0, 0.0])),
            node("b", 2, Some(vec![s, 0.5])),
            node("c", 3, Some(vec![0.5, s])),
        ];
        let groups = cluster_questions(&nodes, 0.85).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![0, 1]);
        assert_eq!(groups[1].members, vec![2]);
    }

    #[test]
    fn uncomparable_nodes_pass_through_as_singletons() {
        let nodes = vec![
            node("a", 1, Some(vec![1.0, 0.0])),
            node("none", 2, None),
            node("wide", 3, Some(vec![1.0, 0.0, 0.0])),
            node("b", 4, Some(vec![1.0, 0.0])),
        ];
        let groups = cluster_questions(&nodes, 0.85).unwrap();
        assert_partition(&groups, 4);
        assert_eq!(groups[0].members, vec![0, 3]);
        assert_eq!(groups[1].similarities, vec![None]);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn ties_keep_input_order() {
        let nodes = vec![
            node("first", 5, Some(vec![0.0, 1.0])),
            node("second", 5, Some(vec![0.0, 1.0])),
        ];
        let groups = cluster_questions(&nodes, 0.85).unwrap();
        assert_eq!(groups[0].representative(), 0);
    }

    #[test]
    fn empty_input() {
        assert!(cluster_questions(&[], 0.85).unwrap().is_empty());
    }
}

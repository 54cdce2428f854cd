//! Progress statistics derived from label history
//!
//! All outputs are recomputed on read from the label store; nothing here is
//! persisted. The reviewed series cover non-prior labels only, in insertion
//! order.

use serde::Serialize;
use sift_common::models::{LabelDecision, LabelOrigin, LabelRecord};

/// Cumulative counts over the label store and document pool
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// Total documents in the pool
    pub n_documents: i64,
    /// Unlabeled documents remaining
    pub n_pool: i64,
    pub n_relevant: i64,
    pub n_irrelevant: i64,
    /// Prior (seed) labels
    pub n_prior: i64,
    /// Model-assisted labels
    pub n_reviewed: i64,
}

/// Cumulative relevant-found curve vs a uniform random baseline
#[derive(Debug, Clone, Serialize)]
pub struct RecallCurve {
    /// Cumulative relevant documents found by the model, by review order
    pub model: Vec<i64>,
    /// Expected cumulative relevant under uniform random screening
    pub random: Vec<f64>,
}

/// Sliding-window fraction of relevant/irrelevant labels over recent reviews
#[derive(Debug, Clone, Serialize)]
pub struct DensityCurve {
    pub relevant: Vec<f64>,
    pub irrelevant: Vec<f64>,
}

/// Derive the counts snapshot
pub fn snapshot(n_documents: i64, labels: &[LabelRecord]) -> ProgressSnapshot {
    let mut stats = ProgressSnapshot {
        n_documents,
        n_pool: n_documents - labels.len() as i64,
        n_relevant: 0,
        n_irrelevant: 0,
        n_prior: 0,
        n_reviewed: 0,
    };

    for label in labels {
        match label.decision {
            LabelDecision::Relevant => stats.n_relevant += 1,
            LabelDecision::Irrelevant => stats.n_irrelevant += 1,
        }
        match label.origin {
            LabelOrigin::Prior => stats.n_prior += 1,
            LabelOrigin::Model => stats.n_reviewed += 1,
        }
    }
    stats
}

/// Reviewed (non-prior) labels in insertion order
fn reviewed(labels: &[LabelRecord]) -> impl Iterator<Item = &LabelRecord> {
    labels
        .iter()
        .filter(|label| label.origin == LabelOrigin::Model)
}

/// Recall curve over the full reviewed history
///
/// `model[i]` counts relevant documents found within the first i+1 reviews;
/// `random[i] = (i+1) * R / N` where R is the relevant count and N the total
/// among reviewed labels (the uniform-order expectation).
pub fn recall_curve(labels: &[LabelRecord]) -> RecallCurve {
    let decisions: Vec<LabelDecision> = reviewed(labels).map(|label| label.decision).collect();

    let n = decisions.len();
    let total_relevant = decisions
        .iter()
        .filter(|d| **d == LabelDecision::Relevant)
        .count() as f64;

    let mut model = Vec::with_capacity(n);
    let mut random = Vec::with_capacity(n);
    let mut found: i64 = 0;
    for (i, decision) in decisions.iter().enumerate() {
        if *decision == LabelDecision::Relevant {
            found += 1;
        }
        model.push(found);
        random.push((i + 1) as f64 * total_relevant / n as f64);
    }

    RecallCurve { model, random }
}

/// Label density over a sliding window of the last `window` reviews
///
/// Detects diminishing returns: when the relevant fraction drops toward zero
/// the remaining pool is mostly irrelevant.
pub fn label_density(labels: &[LabelRecord], window: usize) -> DensityCurve {
    let decisions: Vec<LabelDecision> = reviewed(labels).map(|label| label.decision).collect();
    let window = window.max(1);

    let mut relevant = Vec::with_capacity(decisions.len());
    let mut irrelevant = Vec::with_capacity(decisions.len());
    for i in 0..decisions.len() {
        let start = (i + 1).saturating_sub(window);
        let slice = &decisions[start..=i];
        let n_relevant = slice
            .iter()
            .filter(|d| **d == LabelDecision::Relevant)
            .count() as f64;
        let len = slice.len() as f64;
        relevant.push(n_relevant / len);
        irrelevant.push((len - n_relevant) / len);
    }

    DensityCurve {
        relevant,
        irrelevant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn label(
        doc_id: i64,
        decision: LabelDecision,
        origin: LabelOrigin,
        order_index: i64,
    ) -> LabelRecord {
        LabelRecord {
            doc_id,
            decision,
            origin,
            order_index,
            updated_at: Utc::now(),
        }
    }

    fn history() -> Vec<LabelRecord> {
        vec![
            label(1, LabelDecision::Relevant, LabelOrigin::Prior, 0),
            label(2, LabelDecision::Irrelevant, LabelOrigin::Prior, 1),
            label(3, LabelDecision::Relevant, LabelOrigin::Model, 2),
            label(4, LabelDecision::Relevant, LabelOrigin::Model, 3),
            label(5, LabelDecision::Irrelevant, LabelOrigin::Model, 4),
            label(6, LabelDecision::Relevant, LabelOrigin::Model, 5),
        ]
    }

    #[test]
    fn test_snapshot_counts() {
        let stats = snapshot(100, &history());
        assert_eq!(stats.n_documents, 100);
        assert_eq!(stats.n_pool, 94);
        assert_eq!(stats.n_relevant, 4);
        assert_eq!(stats.n_irrelevant, 2);
        assert_eq!(stats.n_prior, 2);
        assert_eq!(stats.n_reviewed, 4);
    }

    #[test]
    fn test_recall_curve_length_and_monotonicity() {
        let curve = recall_curve(&history());
        // One point per reviewed (non-prior) label
        assert_eq!(curve.model.len(), 4);
        assert_eq!(curve.random.len(), 4);
        assert!(curve.model.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(curve.model, vec![1, 2, 2, 3]);
        // Baseline ends at the full relevant count
        assert!((curve.random[3] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_recall_curve_empty_history() {
        let priors = vec![
            label(1, LabelDecision::Relevant, LabelOrigin::Prior, 0),
            label(2, LabelDecision::Irrelevant, LabelOrigin::Prior, 1),
        ];
        let curve = recall_curve(&priors);
        assert!(curve.model.is_empty());
        assert!(curve.random.is_empty());
    }

    #[test]
    fn test_label_density_window() {
        let curve = label_density(&history(), 2);
        assert_eq!(curve.relevant.len(), 4);
        // Window of 2: [R], [R,R], [R,I], [I,R]
        assert_eq!(curve.relevant, vec![1.0, 1.0, 0.5, 0.5]);
        assert_eq!(curve.irrelevant, vec![0.0, 0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_density_series_sum_to_one() {
        let curve = label_density(&history(), 10);
        for (relevant, irrelevant) in curve.relevant.iter().zip(curve.irrelevant.iter()) {
            assert!((relevant + irrelevant - 1.0).abs() < 1e-9);
        }
    }
}

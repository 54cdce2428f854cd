//! Feature extraction, classifiers and query strategies
//!
//! `train` consumes the full document pool plus the current label history and
//! produces a `Ranking` over the unlabeled documents. The result is fully
//! deterministic for a given label set and seed: stochastic strategies draw
//! from a seeded StdRng, and equal classifier scores are broken by ascending
//! doc id.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sift_common::models::{
    Classifier, Document, LabelDecision, LabelRecord, ModelConfig, QueryStrategy,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Fraction of positions filled from the random pool by the max_random strategy
const MAX_RANDOM_MIX: f64 = 0.05;

/// Ordered sequence of unlabeled doc ids produced by one training run
///
/// Immutable once published; a retrain replaces the whole ranking.
#[derive(Debug, Clone)]
pub struct Ranking {
    /// Monotonic per-project training counter
    pub generation: u64,
    /// Unlabeled doc ids, best first
    pub order: Vec<i64>,
    pub trained_at: DateTime<Utc>,
    /// Size of the label set this ranking was trained on
    pub n_labels: usize,
}

/// Trainer failure
#[derive(Debug, Error)]
pub enum TrainError {
    /// Fewer than one relevant and one irrelevant label exist
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

/// Fit a classifier on the labeled set and rank the unlabeled pool
pub fn train(
    documents: &[Document],
    labels: &[LabelRecord],
    config: &ModelConfig,
    generation: u64,
) -> Result<Ranking, TrainError> {
    let decisions: HashMap<i64, LabelDecision> = labels
        .iter()
        .map(|label| (label.doc_id, label.decision))
        .collect();

    let n_relevant = decisions
        .values()
        .filter(|d| **d == LabelDecision::Relevant)
        .count();
    let n_irrelevant = decisions.len() - n_relevant;
    if n_relevant < 1 || n_irrelevant < 1 {
        return Err(TrainError::InsufficientData(format!(
            "need at least one relevant and one irrelevant label (have {} relevant, {} irrelevant)",
            n_relevant, n_irrelevant
        )));
    }

    let corpus = Corpus::build(documents);

    let mut scores: Vec<(i64, f64)> = Vec::new();
    match config.classifier {
        Classifier::NaiveBayes => {
            let model = NaiveBayes::fit(&corpus, &decisions);
            for (idx, doc) in documents.iter().enumerate() {
                if !decisions.contains_key(&doc.doc_id) {
                    scores.push((doc.doc_id, model.score(&corpus.term_counts[idx])));
                }
            }
        }
        Classifier::Centroid => {
            let model = CentroidModel::fit(&corpus, &decisions);
            for (idx, doc) in documents.iter().enumerate() {
                if !decisions.contains_key(&doc.doc_id) {
                    scores.push((doc.doc_id, model.score(&corpus.tfidf[idx])));
                }
            }
        }
    }

    let order = apply_query_strategy(scores, config.query_strategy, config.seed);

    Ok(Ranking {
        generation,
        order,
        trained_at: Utc::now(),
        n_labels: labels.len(),
    })
}

/// Order scored candidates according to the configured query strategy
fn apply_query_strategy(
    mut scores: Vec<(i64, f64)>,
    strategy: QueryStrategy,
    seed: u64,
) -> Vec<i64> {
    // Stable base order: score descending, ties by ascending doc id
    scores.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    let mut by_score: Vec<i64> = scores.into_iter().map(|(doc_id, _)| doc_id).collect();

    match strategy {
        QueryStrategy::Max => by_score,
        QueryStrategy::Random => {
            by_score.sort_unstable();
            let mut rng = StdRng::seed_from_u64(seed);
            by_score.shuffle(&mut rng);
            by_score
        }
        QueryStrategy::MaxRandom => {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut remaining = by_score;
            let mut order = Vec::with_capacity(remaining.len());
            while !remaining.is_empty() {
                let take_random = remaining.len() > 1 && rng.gen::<f64>() < MAX_RANDOM_MIX;
                let idx = if take_random {
                    rng.gen_range(1..remaining.len())
                } else {
                    0
                };
                order.push(remaining.remove(idx));
            }
            order
        }
    }
}

/// Tokenized corpus with term counts and TF-IDF vectors
struct Corpus {
    /// Doc ids in input order
    doc_ids: Vec<i64>,
    /// Per-document term counts, same order as the input slice
    term_counts: Vec<HashMap<String, f64>>,
    /// Per-document L2-normalized TF-IDF vectors
    tfidf: Vec<HashMap<String, f64>>,
    /// Vocabulary size over the whole pool
    vocab_size: usize,
}

impl Corpus {
    fn build(documents: &[Document]) -> Self {
        let term_counts: Vec<HashMap<String, f64>> = documents
            .iter()
            .map(|doc| {
                let mut counts: HashMap<String, f64> = HashMap::new();
                for token in tokenize(&doc.title).chain(tokenize(&doc.abstract_text)) {
                    *counts.entry(token).or_insert(0.0) += 1.0;
                }
                counts
            })
            .collect();

        // Document frequency over the whole pool
        let mut df: HashMap<&str, f64> = HashMap::new();
        for counts in &term_counts {
            for term in counts.keys() {
                *df.entry(term.as_str()).or_insert(0.0) += 1.0;
            }
        }
        let vocab_size = df.len();
        let n_docs = documents.len().max(1) as f64;
        let idf: HashMap<String, f64> = df
            .into_iter()
            .map(|(term, freq)| (term.to_string(), (n_docs / (1.0 + freq)).ln() + 1.0))
            .collect();

        let tfidf = term_counts
            .iter()
            .map(|counts| {
                let mut vector: HashMap<String, f64> = counts
                    .iter()
                    .map(|(term, tf)| {
                        let weight = tf * idf.get(term).copied().unwrap_or(1.0);
                        (term.clone(), weight)
                    })
                    .collect();
                let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for weight in vector.values_mut() {
                        *weight /= norm;
                    }
                }
                vector
            })
            .collect();

        Self {
            doc_ids: documents.iter().map(|doc| doc.doc_id).collect(),
            term_counts,
            tfidf,
            vocab_size,
        }
    }

    /// Per-document decision lookup, parallel to `term_counts`
    fn doc_decisions<'a>(
        &'a self,
        decisions: &'a HashMap<i64, LabelDecision>,
    ) -> impl Iterator<Item = Option<LabelDecision>> + 'a {
        self.doc_ids
            .iter()
            .map(|doc_id| decisions.get(doc_id).copied())
    }
}

/// Lowercased alphanumeric tokens of length >= 2
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= 2)
        .map(|token| token.to_lowercase())
}

/// Multinomial naive bayes with Laplace smoothing
///
/// Scores are posterior log-odds of relevance; only the ordering matters.
struct NaiveBayes {
    log_prior_odds: f64,
    /// ln p(t|relevant) - ln p(t|irrelevant) per term
    log_likelihood_odds: HashMap<String, f64>,
    /// Odds for terms unseen in either class
    default_odds: f64,
}

impl NaiveBayes {
    fn fit(corpus: &Corpus, decisions: &HashMap<i64, LabelDecision>) -> Self {
        // Index labeled documents by position via doc order in term_counts;
        // the caller guarantees term_counts parallels the document slice, so
        // class totals are accumulated per labeled doc id.
        let mut relevant_counts: HashMap<&str, f64> = HashMap::new();
        let mut irrelevant_counts: HashMap<&str, f64> = HashMap::new();
        let mut relevant_total = 0.0;
        let mut irrelevant_total = 0.0;
        let mut n_relevant: f64 = 0.0;
        let mut n_irrelevant: f64 = 0.0;

        for (counts, decision) in corpus
            .term_counts
            .iter()
            .zip(corpus.doc_decisions(decisions))
        {
            let Some(decision) = decision else { continue };
            let (class_counts, class_total) = match decision {
                LabelDecision::Relevant => {
                    n_relevant += 1.0;
                    (&mut relevant_counts, &mut relevant_total)
                }
                LabelDecision::Irrelevant => {
                    n_irrelevant += 1.0;
                    (&mut irrelevant_counts, &mut irrelevant_total)
                }
            };
            for (term, count) in counts {
                *class_counts.entry(term.as_str()).or_insert(0.0) += count;
                *class_total += count;
            }
        }

        let vocab = corpus.vocab_size.max(1) as f64;
        let relevant_denominator = relevant_total + vocab;
        let irrelevant_denominator = irrelevant_total + vocab;

        let terms: HashSet<&str> = relevant_counts
            .keys()
            .chain(irrelevant_counts.keys())
            .copied()
            .collect();
        let log_likelihood_odds = terms
            .into_iter()
            .map(|term| {
                let p_relevant =
                    (relevant_counts.get(term).copied().unwrap_or(0.0) + 1.0) / relevant_denominator;
                let p_irrelevant = (irrelevant_counts.get(term).copied().unwrap_or(0.0) + 1.0)
                    / irrelevant_denominator;
                (term.to_string(), p_relevant.ln() - p_irrelevant.ln())
            })
            .collect();

        Self {
            log_prior_odds: (n_relevant / (n_relevant + n_irrelevant)).ln()
                - (n_irrelevant / (n_relevant + n_irrelevant)).ln(),
            log_likelihood_odds,
            default_odds: (1.0 / relevant_denominator).ln() - (1.0 / irrelevant_denominator).ln(),
        }
    }

    fn score(&self, term_counts: &HashMap<String, f64>) -> f64 {
        let mut score = self.log_prior_odds;
        for (term, count) in term_counts {
            let odds = self
                .log_likelihood_odds
                .get(term)
                .copied()
                .unwrap_or(self.default_odds);
            score += count * odds;
        }
        score
    }
}

/// Nearest-centroid over TF-IDF: cosine to the relevant centroid minus
/// cosine to the irrelevant centroid
struct CentroidModel {
    relevant: HashMap<String, f64>,
    irrelevant: HashMap<String, f64>,
}

impl CentroidModel {
    fn fit(corpus: &Corpus, decisions: &HashMap<i64, LabelDecision>) -> Self {
        let mut relevant: HashMap<String, f64> = HashMap::new();
        let mut irrelevant: HashMap<String, f64> = HashMap::new();

        for (vector, decision) in corpus.tfidf.iter().zip(corpus.doc_decisions(decisions)) {
            let Some(decision) = decision else { continue };
            let centroid = match decision {
                LabelDecision::Relevant => &mut relevant,
                LabelDecision::Irrelevant => &mut irrelevant,
            };
            for (term, weight) in vector {
                *centroid.entry(term.clone()).or_insert(0.0) += weight;
            }
        }

        normalize(&mut relevant);
        normalize(&mut irrelevant);
        Self {
            relevant,
            irrelevant,
        }
    }

    fn score(&self, vector: &HashMap<String, f64>) -> f64 {
        dot(vector, &self.relevant) - dot(vector, &self.irrelevant)
    }
}

fn normalize(vector: &mut HashMap<String, f64>) {
    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for weight in vector.values_mut() {
            *weight /= norm;
        }
    }
}

fn dot(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    // Iterate the smaller map
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, weight)| large.get(term).map(|other| weight * other))
        .sum()
}

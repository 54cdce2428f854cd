//! Review domain models
//!
//! Closed tagged-variant sets for review state, label decisions and label
//! origin. Out-of-range values are rejected at the serde boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review workflow state
///
/// State progression: setup → training → review ↔ finished.
/// `finished` is advisory, not a lock: labeling remains possible and the
/// project can be moved back to `review` at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    /// Collecting prior labels, no model trained yet
    Setup,
    /// Background training run in progress
    Training,
    /// Ranking published, documents served for screening
    Review,
    /// Marked finished by the reviewer (reversible)
    Finished,
}

impl ReviewState {
    /// String form matching the wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Setup => "setup",
            ReviewState::Training => "training",
            ReviewState::Review => "review",
            ReviewState::Finished => "finished",
        }
    }

    /// Whether the reviewer-facing finished flag may be toggled from this state
    pub fn is_toggleable(&self) -> bool {
        matches!(self, ReviewState::Review | ReviewState::Finished)
    }
}

impl std::str::FromStr for ReviewState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setup" => Ok(ReviewState::Setup),
            "training" => Ok(ReviewState::Training),
            "review" => Ok(ReviewState::Review),
            "finished" => Ok(ReviewState::Finished),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown review state: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label decision for a single document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelDecision {
    Relevant,
    Irrelevant,
}

impl LabelDecision {
    /// Parse the 0/1 flag used on the wire (1 = relevant, 0 = irrelevant)
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            1 => Some(LabelDecision::Relevant),
            0 => Some(LabelDecision::Irrelevant),
            _ => None,
        }
    }

    /// 0/1 flag form used on the wire
    pub fn as_flag(&self) -> i64 {
        match self {
            LabelDecision::Relevant => 1,
            LabelDecision::Irrelevant => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelDecision::Relevant => "relevant",
            LabelDecision::Irrelevant => "irrelevant",
        }
    }
}

impl std::str::FromStr for LabelDecision {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevant" => Ok(LabelDecision::Relevant),
            "irrelevant" => Ok(LabelDecision::Irrelevant),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown label decision: {}",
                other
            ))),
        }
    }
}

/// Whether a label was supplied as a seed (prior) or during model-assisted review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelOrigin {
    /// Seed label supplied before training starts
    Prior,
    /// Label recorded against a model-produced ranking
    Model,
}

impl LabelOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelOrigin::Prior => "prior",
            LabelOrigin::Model => "model",
        }
    }
}

impl std::str::FromStr for LabelOrigin {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prior" => Ok(LabelOrigin::Prior),
            "model" => Ok(LabelOrigin::Model),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown label origin: {}",
                other
            ))),
        }
    }
}

/// A document in the screening pool
///
/// The document set is fixed at upload time; the core treats it as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: i64,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
}

/// One active label for one document
///
/// At most one label exists per document. Relabeling overwrites the decision
/// in place; `order_index` preserves the original insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRecord {
    pub doc_id: i64,
    pub decision: LabelDecision,
    pub origin: LabelOrigin,
    pub order_index: i64,
    pub updated_at: DateTime<Utc>,
}

/// Classifier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classifier {
    /// Multinomial naive bayes over term counts
    #[serde(rename = "nb")]
    NaiveBayes,
    /// Cosine-to-centroid difference over TF-IDF vectors
    #[serde(rename = "centroid")]
    Centroid,
}

/// Query strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    /// Highest predicted relevance first
    Max,
    /// Seeded random order
    Random,
    /// Mostly max with a seeded random fraction mixed in
    MaxRandom,
}

/// Feature extraction selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureExtraction {
    Tfidf,
}

/// Active-learning model configuration for a project
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub classifier: Classifier,
    pub query_strategy: QueryStrategy,
    pub feature_extraction: FeatureExtraction,
    /// Random seed: the same label set with the same seed reproduces the
    /// same ranking
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier: Classifier::NaiveBayes,
            query_strategy: QueryStrategy::Max,
            feature_extraction: FeatureExtraction::Tfidf,
            seed: default_seed(),
        }
    }
}

//! Active-learning review core
//!
//! Orchestrates the label → train → rank → serve loop:
//! - `trainer`: fits a classifier on the labeled set and produces a ranking
//! - `queue`: serves the next unlabeled document from the published ranking
//! - `progress`: derives counts, recall and density curves from label history
//! - `engine`: per-project state machine tying the above together

pub mod engine;
pub mod progress;
pub mod queue;
pub mod trainer;

pub use engine::{ProjectRegistry, ReviewEngine};
pub use trainer::Ranking;

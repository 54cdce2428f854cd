//! Review queue over the published ranking
//!
//! Holds the ranking produced by the most recent successful training run.
//! A published ranking is immutable; retraining swaps in a complete new one
//! behind the lock, so readers never observe a partial ranking.

use crate::review::trainer::Ranking;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Outcome of asking for the next document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextDocument {
    /// Highest-ranked unlabeled document
    Ready(i64),
    /// No unlabeled documents remain in the current ranking
    Exhausted,
    /// No ranking has been published yet
    NotRanked,
}

/// Serves documents in ranking order, skipping anything labeled since the
/// ranking was produced
pub struct ReviewQueue {
    ranking: RwLock<Option<Arc<Ranking>>>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self {
            ranking: RwLock::new(None),
        }
    }

    /// Atomically replace the current ranking
    pub async fn publish(&self, ranking: Ranking) -> Arc<Ranking> {
        let ranking = Arc::new(ranking);
        let mut slot = self.ranking.write().await;
        debug!(
            generation = ranking.generation,
            n_ranked = ranking.order.len(),
            "Published new ranking"
        );
        *slot = Some(Arc::clone(&ranking));
        ranking
    }

    /// Current published ranking, if any
    pub async fn current(&self) -> Option<Arc<Ranking>> {
        self.ranking.read().await.clone()
    }

    /// Drop the published ranking (project reset/delete)
    pub async fn clear(&self) {
        *self.ranking.write().await = None;
    }

    /// Next unlabeled document in ranking order
    ///
    /// `labeled` is the up-to-date label set, so documents labeled after the
    /// ranking was produced are excluded even though the ranking is stale.
    pub async fn next_unlabeled(&self, labeled: &HashSet<i64>) -> NextDocument {
        let Some(ranking) = self.current().await else {
            return NextDocument::NotRanked;
        };

        for doc_id in &ranking.order {
            if !labeled.contains(doc_id) {
                return NextDocument::Ready(*doc_id);
            }
        }
        NextDocument::Exhausted
    }
}

impl Default for ReviewQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ranking(generation: u64, order: Vec<i64>) -> Ranking {
        Ranking {
            generation,
            order,
            trained_at: Utc::now(),
            n_labels: 2,
        }
    }

    #[tokio::test]
    async fn test_not_ranked_before_publish() {
        let queue = ReviewQueue::new();
        assert_eq!(
            queue.next_unlabeled(&HashSet::new()).await,
            NextDocument::NotRanked
        );
    }

    #[tokio::test]
    async fn test_serves_in_ranking_order() {
        let queue = ReviewQueue::new();
        queue.publish(ranking(1, vec![5, 3, 9])).await;

        assert_eq!(
            queue.next_unlabeled(&HashSet::new()).await,
            NextDocument::Ready(5)
        );
    }

    #[tokio::test]
    async fn test_excludes_documents_labeled_after_publish() {
        let queue = ReviewQueue::new();
        queue.publish(ranking(1, vec![5, 3, 9])).await;

        // Doc 5 was labeled after this ranking was produced
        let labeled: HashSet<i64> = [5].into_iter().collect();
        assert_eq!(queue.next_unlabeled(&labeled).await, NextDocument::Ready(3));
    }

    #[tokio::test]
    async fn test_exhausted_when_all_labeled() {
        let queue = ReviewQueue::new();
        queue.publish(ranking(1, vec![5, 3])).await;

        let labeled: HashSet<i64> = [5, 3].into_iter().collect();
        assert_eq!(queue.next_unlabeled(&labeled).await, NextDocument::Exhausted);
    }

    #[tokio::test]
    async fn test_publish_replaces_whole_ranking() {
        let queue = ReviewQueue::new();
        let first = queue.publish(ranking(1, vec![5, 3])).await;
        queue.publish(ranking(2, vec![9])).await;

        // The old Arc is still intact for any in-flight reader
        assert_eq!(first.order, vec![5, 3]);
        assert_eq!(
            queue.next_unlabeled(&HashSet::new()).await,
            NextDocument::Ready(9)
        );
    }
}

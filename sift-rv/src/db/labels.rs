//! Label store database operations
//!
//! Labels are append-only and unique per document: recording the same
//! document again overwrites the decision in place while keeping the
//! original insertion order index. Labels are never physically deleted.

use chrono::{DateTime, Utc};
use sift_common::models::{LabelDecision, LabelOrigin, LabelRecord};
use sift_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

/// Counts over the label store
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LabeledCounts {
    pub n: i64,
    pub n_relevant: i64,
    pub n_irrelevant: i64,
    pub n_prior: i64,
}

fn row_to_label(row: &sqlx::sqlite::SqliteRow) -> Result<LabelRecord> {
    let decision: String = row.get("decision");
    let origin: String = row.get("origin");
    let updated_at: String = row.get("updated_at");
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("invalid updated_at in database: {}", e)))?
        .with_timezone(&Utc);

    Ok(LabelRecord {
        doc_id: row.get("doc_id"),
        decision: decision.parse()?,
        origin: origin.parse()?,
        order_index: row.get("order_index"),
        updated_at,
    })
}

/// Insert a label, or overwrite the decision of an existing one
///
/// On conflict the original `order_index` and `origin` are preserved; only
/// the decision and timestamp change (relabeling, not a new entry).
pub async fn record_label(
    pool: &SqlitePool,
    project_id: Uuid,
    doc_id: i64,
    decision: LabelDecision,
    origin: LabelOrigin,
) -> Result<()> {
    let id = project_id.to_string();

    // The next order index is claimed inside the INSERT itself so two
    // concurrent first-time records cannot read the same MAX
    sqlx::query(
        r#"
        INSERT INTO labels (project_id, doc_id, decision, origin, order_index, updated_at)
        VALUES (
            ?, ?, ?, ?,
            (SELECT COALESCE(MAX(order_index) + 1, 0) FROM labels WHERE project_id = ?),
            ?
        )
        ON CONFLICT(project_id, doc_id) DO UPDATE SET
            decision = excluded.decision,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&id)
    .bind(doc_id)
    .bind(decision.as_str())
    .bind(origin.as_str())
    .bind(&id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the decision of an existing label
///
/// Returns false when the document has no label yet.
pub async fn update_decision(
    pool: &SqlitePool,
    project_id: Uuid,
    doc_id: i64,
    decision: LabelDecision,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE labels SET decision = ?, updated_at = ? WHERE project_id = ? AND doc_id = ?",
    )
    .bind(decision.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(project_id.to_string())
    .bind(doc_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load the active label for one document, None if unlabeled
pub async fn get_label(
    pool: &SqlitePool,
    project_id: Uuid,
    doc_id: i64,
) -> Result<Option<LabelRecord>> {
    let row = sqlx::query(
        r#"
        SELECT doc_id, decision, origin, order_index, updated_at
        FROM labels
        WHERE project_id = ? AND doc_id = ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(doc_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_label(&row)?)),
        None => Ok(None),
    }
}

/// All labels in insertion order
pub async fn get_labeled(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<LabelRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT doc_id, decision, origin, order_index, updated_at
        FROM labels
        WHERE project_id = ?
        ORDER BY order_index ASC
        "#,
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_label).collect()
}

/// The set of labeled doc ids (for ranking exclusion)
pub async fn labeled_doc_ids(pool: &SqlitePool, project_id: Uuid) -> Result<HashSet<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT doc_id FROM labels WHERE project_id = ?")
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|(doc_id,)| doc_id).collect())
}

/// Counts partitioned by decision and origin
pub async fn get_counts(pool: &SqlitePool, project_id: Uuid) -> Result<LabeledCounts> {
    let rows: Vec<(String, String, i64)> = sqlx::query_as(
        "SELECT decision, origin, COUNT(*) FROM labels WHERE project_id = ? GROUP BY decision, origin",
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut counts = LabeledCounts::default();
    for (decision, origin, count) in rows {
        counts.n += count;
        match decision.parse::<LabelDecision>()? {
            LabelDecision::Relevant => counts.n_relevant += count,
            LabelDecision::Irrelevant => counts.n_irrelevant += count,
        }
        if origin.parse::<LabelOrigin>()? == LabelOrigin::Prior {
            counts.n_prior += count;
        }
    }
    Ok(counts)
}

/// Prior-label counts partitioned by decision
///
/// Backs the start precondition: at least one relevant and one irrelevant
/// prior label must exist before the first training run.
pub async fn prior_decision_counts(pool: &SqlitePool, project_id: Uuid) -> Result<(i64, i64)> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT decision, COUNT(*) FROM labels WHERE project_id = ? AND origin = 'prior' GROUP BY decision",
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut n_relevant = 0;
    let mut n_irrelevant = 0;
    for (decision, count) in rows {
        match decision.parse::<LabelDecision>()? {
            LabelDecision::Relevant => n_relevant += count,
            LabelDecision::Irrelevant => n_irrelevant += count,
        }
    }
    Ok((n_relevant, n_irrelevant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        crate::db::init_tables(&pool).await.expect("init tables");
        pool
    }

    #[tokio::test]
    async fn test_order_index_is_sequential() {
        let pool = test_pool().await;
        let project_id = Uuid::new_v4();

        for doc_id in [7, 3, 9] {
            record_label(
                &pool,
                project_id,
                doc_id,
                LabelDecision::Relevant,
                LabelOrigin::Prior,
            )
            .await
            .unwrap();
        }

        let labeled = get_labeled(&pool, project_id).await.unwrap();
        let indexes: Vec<i64> = labeled.iter().map(|label| label.order_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        // Insertion order, not doc id order
        let doc_ids: Vec<i64> = labeled.iter().map(|label| label.doc_id).collect();
        assert_eq!(doc_ids, vec![7, 3, 9]);
    }

    #[tokio::test]
    async fn test_rerecord_preserves_index_and_origin() {
        let pool = test_pool().await;
        let project_id = Uuid::new_v4();

        record_label(&pool, project_id, 1, LabelDecision::Relevant, LabelOrigin::Prior)
            .await
            .unwrap();
        record_label(&pool, project_id, 2, LabelDecision::Irrelevant, LabelOrigin::Prior)
            .await
            .unwrap();

        // Re-recording flips the decision in place
        record_label(&pool, project_id, 1, LabelDecision::Irrelevant, LabelOrigin::Model)
            .await
            .unwrap();

        let label = get_label(&pool, project_id, 1).await.unwrap().unwrap();
        assert_eq!(label.decision, LabelDecision::Irrelevant);
        assert_eq!(label.origin, LabelOrigin::Prior);
        assert_eq!(label.order_index, 0);
        assert_eq!(get_labeled(&pool, project_id).await.unwrap().len(), 2);
    }
}

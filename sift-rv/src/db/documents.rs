//! Document pool database operations
//!
//! The document set is fixed at upload time and read-only afterwards.

use sift_common::models::Document;
use sift_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Bulk-insert the document set for a project (single transaction)
pub async fn insert_documents(
    pool: &SqlitePool,
    project_id: Uuid,
    documents: &[Document],
) -> Result<()> {
    let id = project_id.to_string();
    let mut tx = pool.begin().await?;

    for doc in documents {
        sqlx::query(
            r#"
            INSERT INTO documents (project_id, doc_id, title, abstract)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(doc.doc_id)
        .bind(&doc.title)
        .bind(&doc.abstract_text)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Number of documents in the project pool
pub async fn count_documents(pool: &SqlitePool, project_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE project_id = ?")
        .bind(project_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Whether a given document exists in the project pool
pub async fn document_exists(pool: &SqlitePool, project_id: Uuid, doc_id: i64) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE project_id = ? AND doc_id = ?)",
    )
    .bind(project_id.to_string())
    .bind(doc_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        doc_id: row.get("doc_id"),
        title: row.get("title"),
        abstract_text: row.get("abstract"),
    }
}

/// Load one document
pub async fn get_document(
    pool: &SqlitePool,
    project_id: Uuid,
    doc_id: i64,
) -> Result<Option<Document>> {
    let row = sqlx::query(
        "SELECT doc_id, title, abstract FROM documents WHERE project_id = ? AND doc_id = ?",
    )
    .bind(project_id.to_string())
    .bind(doc_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_document))
}

/// Load the full document pool ordered by doc id
pub async fn all_documents(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        "SELECT doc_id, title, abstract FROM documents WHERE project_id = ? ORDER BY doc_id ASC",
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_document).collect())
}

/// Case-insensitive substring search over title and abstract
pub async fn search_documents(
    pool: &SqlitePool,
    project_id: Uuid,
    query: &str,
    n_max: usize,
) -> Result<Vec<Document>> {
    let pattern = format!("%{}%", query);
    let rows = sqlx::query(
        r#"
        SELECT doc_id, title, abstract
        FROM documents
        WHERE project_id = ? AND (title LIKE ? OR abstract LIKE ?)
        ORDER BY doc_id ASC
        LIMIT ?
        "#,
    )
    .bind(project_id.to_string())
    .bind(&pattern)
    .bind(&pattern)
    .bind(n_max as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_document).collect())
}

/// Doc ids in the pool that currently carry no label, ordered by doc id
pub async fn unlabeled_doc_ids(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<i64>> {
    let id = project_id.to_string();
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT d.doc_id
        FROM documents d
        LEFT JOIN labels l ON l.project_id = d.project_id AND l.doc_id = d.doc_id
        WHERE d.project_id = ? AND l.doc_id IS NULL
        ORDER BY d.doc_id ASC
        "#,
    )
    .bind(&id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(doc_id,)| doc_id).collect())
}

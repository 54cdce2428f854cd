//! Project database operations
//!
//! The projects table is the durable record of review state: engine state
//! transitions write through here so projects survive a restart.

use chrono::{DateTime, Utc};
use sift_common::models::{ModelConfig, ReviewState};
use sift_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// One project row
#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub project_id: Uuid,
    pub name: String,
    pub authors: String,
    pub description: String,
    pub state: ReviewState,
    pub model_config: ModelConfig,
    pub created_at: DateTime<Utc>,
}

/// Dashboard counts partitioned by state
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProjectStats {
    pub n_setup: i64,
    pub n_in_review: i64,
    pub n_finished: i64,
}

fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> Result<ProjectRow> {
    let project_id: String = row.get("project_id");
    let project_id = Uuid::parse_str(&project_id)
        .map_err(|e| Error::Internal(format!("invalid project id in database: {}", e)))?;

    let state: String = row.get("state");
    let state: ReviewState = state.parse()?;

    let model_config: String = row.get("model_config");
    let model_config: ModelConfig = serde_json::from_str(&model_config)
        .map_err(|e| Error::Internal(format!("failed to deserialize model config: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("invalid created_at in database: {}", e)))?
        .with_timezone(&Utc);

    Ok(ProjectRow {
        project_id,
        name: row.get("name"),
        authors: row.get("authors"),
        description: row.get("description"),
        state,
        model_config,
        created_at,
    })
}

/// Create a new project in setup state with the default model config
pub async fn create_project(
    pool: &SqlitePool,
    name: &str,
    authors: &str,
    description: &str,
) -> Result<ProjectRow> {
    let project = ProjectRow {
        project_id: Uuid::new_v4(),
        name: name.to_string(),
        authors: authors.to_string(),
        description: description.to_string(),
        state: ReviewState::Setup,
        model_config: ModelConfig::default(),
        created_at: Utc::now(),
    };

    let model_config = serde_json::to_string(&project.model_config)
        .map_err(|e| Error::Internal(format!("failed to serialize model config: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO projects (project_id, name, authors, description, state, model_config, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(project.project_id.to_string())
    .bind(&project.name)
    .bind(&project.authors)
    .bind(&project.description)
    .bind(project.state.as_str())
    .bind(&model_config)
    .bind(project.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(project)
}

/// Load one project, None if unknown
pub async fn get_project(pool: &SqlitePool, project_id: Uuid) -> Result<Option<ProjectRow>> {
    let row = sqlx::query(
        r#"
        SELECT project_id, name, authors, description, state, model_config, created_at
        FROM projects
        WHERE project_id = ?
        "#,
    )
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_project(&row)?)),
        None => Ok(None),
    }
}

/// List all projects in creation order
pub async fn list_projects(pool: &SqlitePool) -> Result<Vec<ProjectRow>> {
    let rows = sqlx::query(
        r#"
        SELECT project_id, name, authors, description, state, model_config, created_at
        FROM projects
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_project).collect()
}

/// Check whether a project still exists
///
/// Used by the trainer before committing results, so in-flight work never
/// writes to deleted storage.
pub async fn project_exists(pool: &SqlitePool, project_id: Uuid) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM projects WHERE project_id = ?)")
            .bind(project_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// Update project metadata (name/authors/description)
pub async fn update_info(
    pool: &SqlitePool,
    project_id: Uuid,
    name: &str,
    authors: &str,
    description: &str,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE projects SET name = ?, authors = ?, description = ? WHERE project_id = ?",
    )
    .bind(name)
    .bind(authors)
    .bind(description)
    .bind(project_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("project {}", project_id)));
    }
    Ok(())
}

/// Persist a review state transition
pub async fn update_state(pool: &SqlitePool, project_id: Uuid, state: ReviewState) -> Result<()> {
    sqlx::query("UPDATE projects SET state = ? WHERE project_id = ?")
        .bind(state.as_str())
        .bind(project_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist the model configuration
pub async fn update_model_config(
    pool: &SqlitePool,
    project_id: Uuid,
    config: &ModelConfig,
) -> Result<()> {
    let model_config = serde_json::to_string(config)
        .map_err(|e| Error::Internal(format!("failed to serialize model config: {}", e)))?;

    sqlx::query("UPDATE projects SET model_config = ? WHERE project_id = ?")
        .bind(&model_config)
        .bind(project_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a project and all of its documents and labels
pub async fn delete_project(pool: &SqlitePool, project_id: Uuid) -> Result<()> {
    let id = project_id.to_string();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM labels WHERE project_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE project_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM projects WHERE project_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("project {}", project_id)));
    }
    Ok(())
}

/// Dashboard statistics over all projects
pub async fn get_stats(pool: &SqlitePool) -> Result<ProjectStats> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT state, COUNT(*) FROM projects GROUP BY state")
            .fetch_all(pool)
            .await?;

    let mut stats = ProjectStats::default();
    for (state, count) in rows {
        match state.parse::<ReviewState>()? {
            ReviewState::Setup => stats.n_setup += count,
            // A project mid-training has begun its review
            ReviewState::Training | ReviewState::Review => stats.n_in_review += count,
            ReviewState::Finished => stats.n_finished += count,
        }
    }
    Ok(stats)
}

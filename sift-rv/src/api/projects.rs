//! Project lifecycle endpoints
//!
//! Create, list, inspect, update and delete projects, plus the document
//! pool upload and the prior-screening helpers (search and random sample).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sift_common::events::SiftEvent;
use sift_common::models::{Document, ReviewState};
use tracing::info;
use uuid::Uuid;

use crate::db::{documents, projects, settings};
use crate::error::{ApiError, ApiResult};
use crate::review::ReviewEngine;
use crate::AppState;

/// Project metadata as returned to clients
#[derive(Debug, Serialize)]
pub struct ProjectInfo {
    pub id: Uuid,
    pub name: String,
    pub authors: String,
    pub description: String,
    pub status: ReviewState,
    pub created_at: DateTime<Utc>,
}

impl From<&projects::ProjectRow> for ProjectInfo {
    fn from(row: &projects::ProjectRow) -> Self {
        Self {
            id: row.project_id,
            name: row.name.clone(),
            authors: row.authors.clone(),
            description: row.description.clone(),
            status: row.state,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectInfo>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("project name must not be empty".to_string()));
    }

    let row = projects::create_project(&state.db, &req.name, &req.authors, &req.description).await?;
    info!(project_id = %row.project_id, name = %row.name, "Project created");

    let engine = ReviewEngine::hydrate(state.db.clone(), state.event_bus.clone(), &row).await?;
    state.registry.insert(engine).await;

    state.event_bus.emit_lossy(SiftEvent::ProjectCreated {
        project_id: row.project_id,
        timestamp: Utc::now(),
    });

    Ok((StatusCode::CREATED, Json(ProjectInfo::from(&row))))
}

/// GET /api/projects
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = projects::list_projects(&state.db).await?;
    let result: Vec<ProjectInfo> = rows.iter().map(ProjectInfo::from).collect();
    Ok(Json(json!({ "result": result })))
}

/// GET /api/projects/stats
pub async fn project_stats(State(state): State<AppState>) -> ApiResult<Json<projects::ProjectStats>> {
    Ok(Json(projects::get_stats(&state.db).await?))
}

/// GET /api/projects/:id/info
pub async fn get_info(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectInfo>> {
    let row = projects::get_project(&state.db, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {}", project_id)))?;
    Ok(Json(ProjectInfo::from(&row)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateInfoRequest {
    pub name: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub description: String,
}

/// PUT /api/projects/:id/info
pub async fn update_info(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateInfoRequest>,
) -> ApiResult<Json<ProjectInfo>> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("project name must not be empty".to_string()));
    }

    projects::update_info(&state.db, project_id, &req.name, &req.authors, &req.description)
        .await
        .map_err(|e| match e {
            sift_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Common(other),
        })?;

    get_info(State(state), Path(project_id)).await
}

/// DELETE /api/projects/:id
///
/// Cancels any in-flight training before the storage delete so the trainer
/// cannot commit against removed rows.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.registry.remove(project_id).await;

    projects::delete_project(&state.db, project_id)
        .await
        .map_err(|e| match e {
            sift_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Common(other),
        })?;

    info!(project_id = %project_id, "Project deleted");
    state.event_bus.emit_lossy(SiftEvent::ProjectDeleted {
        project_id,
        timestamp: Utc::now(),
    });

    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentsRequest {
    pub documents: Vec<Document>,
}

/// POST /api/projects/:id/documents
///
/// The pool is fixed once uploaded: a second upload is rejected rather
/// than merged.
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UploadDocumentsRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let engine = state.engine(project_id).await?;

    let current = engine.state().await;
    if current != ReviewState::Setup {
        return Err(ApiError::InvalidState {
            operation: "upload_documents",
            state: current,
        });
    }
    if req.documents.is_empty() {
        return Err(ApiError::BadRequest("document set must not be empty".to_string()));
    }
    if documents::count_documents(&state.db, project_id).await? > 0 {
        return Err(ApiError::BadRequest(
            "project already has a document set".to_string(),
        ));
    }

    let n_documents = req.documents.len();
    documents::insert_documents(&state.db, project_id, &req.documents).await?;
    info!(project_id = %project_id, n_documents, "Document pool uploaded");

    Ok((StatusCode::CREATED, Json(json!({ "n_documents": n_documents }))))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_search_limit")]
    pub n_max: usize,
}

fn default_search_limit() -> usize {
    10
}

/// GET /api/projects/:id/search
pub async fn search_documents(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    // Resolving the engine doubles as the project existence check
    state.engine(project_id).await?;

    let result = documents::search_documents(&state.db, project_id, &query.q, query.n_max).await?;
    Ok(Json(json!({ "result": result })))
}

#[derive(Debug, Deserialize)]
pub struct PriorRandomQuery {
    pub n: Option<usize>,
}

/// GET /api/projects/:id/prior_random
///
/// Random sample of unlabeled documents as prior-screening candidates.
pub async fn prior_random(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<PriorRandomQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine(project_id).await?;

    let n = match query.n {
        Some(n) => n,
        None => settings::get_prior_random_n(&state.db).await?,
    };

    let mut pool = documents::unlabeled_doc_ids(&state.db, project_id).await?;
    pool.shuffle(&mut rand::thread_rng());
    pool.truncate(n);

    let mut result = Vec::with_capacity(pool.len());
    for doc_id in pool {
        if let Some(doc) = documents::get_document(&state.db, project_id, doc_id).await? {
            result.push(doc);
        }
    }

    Ok(Json(json!({ "result": result })))
}

/// Build project routes
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", post(create_project).get(list_projects))
        .route("/api/projects/stats", get(project_stats))
        .route("/api/projects/:project_id/info", get(get_info).put(update_info))
        .route("/api/projects/:project_id", axum::routing::delete(delete_project))
        .route("/api/projects/:project_id/documents", post(upload_documents))
        .route("/api/projects/:project_id/search", get(search_documents))
        .route("/api/projects/:project_id/prior_random", get(prior_random))
}

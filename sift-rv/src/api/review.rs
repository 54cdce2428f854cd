//! Review loop endpoints
//!
//! Label recording, training start, status polling and document serving.
//! Every operation resolves its project engine by id; there is no ambient
//! current project.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sift_common::models::{LabelDecision, ReviewState};
use uuid::Uuid;

use crate::db::documents;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordLabelRequest {
    /// 1 = relevant, 0 = irrelevant
    pub label: i64,
    /// 1 when this is a seed label supplied before training
    #[serde(default)]
    pub is_prior: i64,
}

/// POST /api/projects/:id/record/:doc_id
pub async fn record_label(
    State(state): State<AppState>,
    Path((project_id, doc_id)): Path<(Uuid, i64)>,
    Json(req): Json<RecordLabelRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let decision = LabelDecision::from_flag(req.label)
        .ok_or_else(|| ApiError::BadRequest(format!("label must be 0 or 1, got {}", req.label)))?;

    let engine = state.engine(project_id).await?;
    engine.record_label(doc_id, decision, req.is_prior == 1).await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateLabelRequest {
    pub label: i64,
}

/// PUT /api/projects/:id/record/:doc_id
///
/// Overwrites the decision of an existing label; the document must already
/// be labeled.
pub async fn update_label(
    State(state): State<AppState>,
    Path((project_id, doc_id)): Path<(Uuid, i64)>,
    Json(req): Json<UpdateLabelRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let decision = LabelDecision::from_flag(req.label)
        .ok_or_else(|| ApiError::BadRequest(format!("label must be 0 or 1, got {}", req.label)))?;

    let engine = state.engine(project_id).await?;
    engine.update_label(doc_id, decision).await?;

    Ok(Json(json!({ "success": true })))
}

/// POST /api/projects/:id/start
///
/// Kicks off a background training run and returns immediately; progress is
/// observed by polling the status endpoint.
pub async fn start_review(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = state.engine(project_id).await?;
    engine.start_training().await?;
    Ok(Json(json!({ "status": ReviewState::Training })))
}

/// GET /api/projects/:id/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = state.engine(project_id).await?;
    let (status, last_error) = engine.status().await;

    let mut body = json!({ "status": status });
    if let Some(error) = last_error {
        body["last_error"] = json!(error);
    }
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// PUT /api/projects/:id/status
///
/// Toggles between review and finished; both directions are valid and the
/// toggle is idempotent.
pub async fn update_status(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let requested: ReviewState = req
        .status
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown status: {}", req.status)))?;

    let engine = state.engine(project_id).await?;
    engine.set_status(requested).await?;

    Ok(Json(json!({ "status": requested })))
}

/// GET /api/projects/:id/get_document
///
/// Serves the highest-ranked unlabeled document. An exhausted ranking is a
/// normal result (`pool_empty` true, `result` null), not an error.
pub async fn get_document(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = state.engine(project_id).await?;

    match engine.next_document().await? {
        Some(doc_id) => {
            let doc = documents::get_document(&state.db, project_id, doc_id)
                .await?
                .ok_or_else(|| {
                    ApiError::Internal(format!("ranked document {} missing from pool", doc_id))
                })?;
            Ok(Json(json!({ "result": doc, "pool_empty": false })))
        }
        None => Ok(Json(json!({ "result": null, "pool_empty": true }))),
    }
}

/// Build review loop routes
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/projects/:project_id/record/:doc_id",
            post(record_label).put(update_label),
        )
        .route("/api/projects/:project_id/start", post(start_review))
        .route(
            "/api/projects/:project_id/status",
            get(get_status).put(update_status),
        )
        .route("/api/projects/:project_id/get_document", get(get_document))
}

//! Progress and export endpoints
//!
//! All statistics are recomputed from the label store on read; nothing is
//! cached between calls.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sift_common::models::LabelRecord;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::{documents, labels, settings};
use crate::error::{ApiError, ApiResult};
use crate::review::progress;
use crate::AppState;

/// GET /api/projects/:id/labeled
pub async fn get_labeled(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine(project_id).await?;
    let result = labels::get_labeled(&state.db, project_id).await?;
    Ok(Json(json!({ "result": result })))
}

/// GET /api/projects/:id/labeled_stats
pub async fn labeled_stats(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<labels::LabeledCounts>> {
    state.engine(project_id).await?;
    Ok(Json(labels::get_counts(&state.db, project_id).await?))
}

/// GET /api/projects/:id/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<progress::ProgressSnapshot>> {
    state.engine(project_id).await?;

    let n_documents = documents::count_documents(&state.db, project_id).await?;
    let history = labels::get_labeled(&state.db, project_id).await?;
    Ok(Json(progress::snapshot(n_documents, &history)))
}

/// GET /api/projects/:id/progress_density
pub async fn progress_density(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<progress::DensityCurve>> {
    state.engine(project_id).await?;

    let window = settings::get_density_window(&state.db).await?;
    let history = labels::get_labeled(&state.db, project_id).await?;
    Ok(Json(progress::label_density(&history, window)))
}

/// GET /api/projects/:id/progress_recall
pub async fn progress_recall(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<progress::RecallCurve>> {
    state.engine(project_id).await?;

    let history = labels::get_labeled(&state.db, project_id).await?;
    Ok(Json(progress::recall_curve(&history)))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub file_format: String,
}

/// Quote a CSV field when it contains the delimiter, a quote or a newline
fn csv_field(value: &str, delimiter: char) -> String {
    if value.contains(delimiter) || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// GET /api/projects/:id/export_dataset?file_format=csv|tsv
///
/// Full document pool with the current label column (empty for unlabeled
/// documents). Unsupported formats are a 400, not a fallback to csv.
pub async fn export_dataset(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    state.engine(project_id).await?;

    let (delimiter, content_type, extension) = match query.file_format.as_str() {
        "csv" => (',', "text/csv; charset=utf-8", "csv"),
        "tsv" => ('\t', "text/tab-separated-values; charset=utf-8", "tsv"),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unsupported file format: {}",
                other
            )));
        }
    };

    let pool = documents::all_documents(&state.db, project_id).await?;
    let by_doc: HashMap<i64, LabelRecord> = labels::get_labeled(&state.db, project_id)
        .await?
        .into_iter()
        .map(|label| (label.doc_id, label))
        .collect();

    let mut body = String::new();
    body.push_str(&format!(
        "doc_id{d}title{d}abstract{d}label\n",
        d = delimiter
    ));
    for doc in &pool {
        let label = by_doc
            .get(&doc.doc_id)
            .map(|record| record.decision.as_flag().to_string())
            .unwrap_or_default();
        body.push_str(&format!(
            "{}{d}{}{d}{}{d}{}\n",
            doc.doc_id,
            csv_field(&doc.title, delimiter),
            csv_field(&doc.abstract_text, delimiter),
            label,
            d = delimiter
        ));
    }

    let disposition = format!("attachment; filename=\"dataset.{}\"", extension);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Build progress and export routes
pub fn progress_routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects/:project_id/labeled", get(get_labeled))
        .route("/api/projects/:project_id/labeled_stats", get(labeled_stats))
        .route("/api/projects/:project_id/progress", get(get_progress))
        .route("/api/projects/:project_id/progress_density", get(progress_density))
        .route("/api/projects/:project_id/progress_recall", get(progress_recall))
        .route("/api/projects/:project_id/export_dataset", get(export_dataset))
}

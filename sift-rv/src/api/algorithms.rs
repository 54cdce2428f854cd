//! Model configuration endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sift_common::models::{ModelConfig, ReviewState};
use tracing::info;
use uuid::Uuid;

use crate::db::projects;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/algorithms
///
/// The closed set of supported model components.
pub async fn list_algorithms() -> Json<serde_json::Value> {
    Json(json!({
        "classifiers": ["nb", "centroid"],
        "query_strategies": ["max", "random", "max_random"],
        "feature_extractions": ["tfidf"],
    }))
}

/// GET /api/projects/:id/algorithms
pub async fn get_project_algorithms(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ModelConfig>> {
    let row = projects::get_project(&state.db, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {}", project_id)))?;
    Ok(Json(row.model_config))
}

/// POST /api/projects/:id/algorithms
///
/// The configuration is fixed once training has started; changes are only
/// accepted during setup. Unknown component names are rejected at the serde
/// boundary with a 422.
pub async fn set_project_algorithms(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(config): Json<ModelConfig>,
) -> ApiResult<Json<ModelConfig>> {
    let engine = state.engine(project_id).await?;

    let current = engine.state().await;
    if current != ReviewState::Setup {
        return Err(ApiError::InvalidState {
            operation: "set_algorithms",
            state: current,
        });
    }

    projects::update_model_config(&state.db, project_id, &config).await?;
    info!(
        project_id = %project_id,
        classifier = ?config.classifier,
        query_strategy = ?config.query_strategy,
        "Model configuration updated"
    );
    Ok(Json(config))
}

/// Build algorithm routes
pub fn algorithm_routes() -> Router<AppState> {
    Router::new()
        .route("/api/algorithms", get(list_algorithms))
        .route(
            "/api/projects/:project_id/algorithms",
            get(get_project_algorithms).post(set_project_algorithms),
        )
}

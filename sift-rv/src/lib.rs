//! sift-rv library interface
//!
//! Review service core: project lifecycle, label store, background trainer
//! and the review queue, exposed over an HTTP API with an SSE event stream.

pub mod api;
pub mod db;
pub mod error;
pub mod review;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sift_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::review::{ProjectRegistry, ReviewEngine};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Per-project review engines
    pub registry: ProjectRegistry,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self {
            db,
            event_bus,
            registry: ProjectRegistry::new(),
            startup_time: Utc::now(),
        }
    }

    /// Resolve the review engine for a project (404 for unknown ids)
    pub async fn engine(&self, project_id: Uuid) -> ApiResult<Arc<ReviewEngine>> {
        self.registry.get(&self.db, &self.event_bus, project_id).await
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::project_routes())
        .merge(api::review_routes())
        .merge(api::progress_routes())
        .merge(api::algorithm_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! Per-project review engine and registry
//!
//! One `ReviewEngine` owns the state machine for one project: it gates label
//! recording, spawns at most one background training run at a time, publishes
//! the resulting ranking to the review queue, and surfaces trainer failures
//! on the next status poll. Projects are fully independent; the registry maps
//! project ids to engines and hydrates them lazily from the database.

use crate::db::{documents, labels, projects};
use crate::error::{ApiError, ApiResult};
use crate::review::queue::{NextDocument, ReviewQueue};
use crate::review::trainer::{self, Ranking};
use chrono::Utc;
use sift_common::events::{EventBus, SiftEvent};
use sift_common::models::{LabelDecision, LabelOrigin, ReviewState};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of one background training run
enum TrainingOutcome {
    /// New ranking published, state advanced to review
    Published { n_ranked: usize },
    /// Run ended without publishing (cancelled or project deleted)
    Abandoned,
}

/// Review state machine for one project
pub struct ReviewEngine {
    project_id: Uuid,
    db: SqlitePool,
    event_bus: EventBus,
    state: RwLock<ReviewState>,
    queue: ReviewQueue,
    /// Monotonic training counter, also used as ranking generation
    generation: AtomicU64,
    /// Token for the in-flight training run, if any
    training_cancel: RwLock<Option<CancellationToken>>,
    /// Most recent trainer failure, surfaced by status polls
    last_training_error: RwLock<Option<String>>,
}

impl ReviewEngine {
    /// Hydrate an engine from a persisted project row
    ///
    /// A project persisted mid-training has no live task after a restart, so
    /// `training` is demoted back to `setup` and written through.
    pub async fn hydrate(
        db: SqlitePool,
        event_bus: EventBus,
        row: &projects::ProjectRow,
    ) -> ApiResult<Arc<Self>> {
        let state = match row.state {
            ReviewState::Training => {
                warn!(
                    project_id = %row.project_id,
                    "Project was persisted mid-training; reverting to setup"
                );
                projects::update_state(&db, row.project_id, ReviewState::Setup).await?;
                ReviewState::Setup
            }
            state => state,
        };

        Ok(Arc::new(Self {
            project_id: row.project_id,
            db,
            event_bus,
            state: RwLock::new(state),
            queue: ReviewQueue::new(),
            generation: AtomicU64::new(0),
            training_cancel: RwLock::new(None),
            last_training_error: RwLock::new(None),
        }))
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    /// Current review state
    pub async fn state(&self) -> ReviewState {
        *self.state.read().await
    }

    /// Current state plus the most recent trainer failure, if any
    pub async fn status(&self) -> (ReviewState, Option<String>) {
        let state = *self.state.read().await;
        let last_error = self.last_training_error.read().await.clone();
        (state, last_error)
    }

    /// Current published ranking, if any
    pub async fn current_ranking(&self) -> Option<Arc<Ranking>> {
        self.queue.current().await
    }

    /// Persist and broadcast a state transition
    async fn transition(&self, old_state: ReviewState, new_state: ReviewState) -> ApiResult<()> {
        projects::update_state(&self.db, self.project_id, new_state).await?;
        self.event_bus.emit_lossy(SiftEvent::StateChanged {
            project_id: self.project_id,
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Toggle between review and finished
    ///
    /// Reversible and idempotent; any other target or source state is
    /// rejected without side effects.
    pub async fn set_status(&self, requested: ReviewState) -> ApiResult<()> {
        let old_state = {
            let mut state = self.state.write().await;
            if !requested.is_toggleable() || !state.is_toggleable() {
                return Err(ApiError::InvalidState {
                    operation: "update_status",
                    state: *state,
                });
            }
            let old_state = *state;
            *state = requested;
            old_state
        };

        if old_state != requested {
            self.transition(old_state, requested).await?;
        }
        Ok(())
    }

    /// Record a label (insert, or overwrite an existing decision)
    pub async fn record_label(
        &self,
        doc_id: i64,
        decision: LabelDecision,
        is_prior: bool,
    ) -> ApiResult<()> {
        if !documents::document_exists(&self.db, self.project_id, doc_id).await? {
            return Err(ApiError::InvalidDocument(doc_id));
        }

        let state = self.state().await;
        if state == ReviewState::Setup && !is_prior {
            return Err(ApiError::InvalidState {
                operation: "record_model_label",
                state,
            });
        }

        let origin = if is_prior {
            LabelOrigin::Prior
        } else {
            LabelOrigin::Model
        };
        labels::record_label(&self.db, self.project_id, doc_id, decision, origin).await?;

        info!(
            project_id = %self.project_id,
            doc_id,
            decision = decision.as_str(),
            origin = origin.as_str(),
            "Label recorded"
        );
        self.event_bus.emit_lossy(SiftEvent::LabelRecorded {
            project_id: self.project_id,
            doc_id,
            decision,
            origin,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Overwrite the decision of an existing label
    pub async fn update_label(&self, doc_id: i64, decision: LabelDecision) -> ApiResult<()> {
        if !documents::document_exists(&self.db, self.project_id, doc_id).await? {
            return Err(ApiError::InvalidDocument(doc_id));
        }

        if !labels::update_decision(&self.db, self.project_id, doc_id, decision).await? {
            return Err(ApiError::BadRequest(format!(
                "document {} has no label to update",
                doc_id
            )));
        }

        // The overwrite preserved the original origin; report it faithfully
        let origin = labels::get_label(&self.db, self.project_id, doc_id)
            .await?
            .map(|label| label.origin)
            .unwrap_or(LabelOrigin::Model);

        self.event_bus.emit_lossy(SiftEvent::LabelRecorded {
            project_id: self.project_id,
            doc_id,
            decision,
            origin,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Begin a background training run
    ///
    /// Returns immediately; completion is observed by polling `status`.
    /// Valid from `setup` (first training, gated on the prior-label
    /// precondition) and from `review` (retrain over the full label history).
    /// A second start while training is rejected rather than queued.
    pub async fn start_training(self: &Arc<Self>) -> ApiResult<()> {
        let old_state = {
            // Check and transition under one lock so concurrent starts
            // cannot both pass the state gate
            let mut state = self.state.write().await;
            match *state {
                ReviewState::Setup => {
                    let (n_relevant, n_irrelevant) =
                        labels::prior_decision_counts(&self.db, self.project_id).await?;
                    if n_relevant < 1 || n_irrelevant < 1 {
                        return Err(ApiError::Precondition(format!(
                            "training requires at least one relevant and one irrelevant prior label \
                             (have {} relevant, {} irrelevant)",
                            n_relevant, n_irrelevant
                        )));
                    }
                }
                ReviewState::Review => {}
                state => {
                    return Err(ApiError::InvalidState {
                        operation: "start",
                        state,
                    });
                }
            }
            let old_state = *state;
            *state = ReviewState::Training;
            old_state
        };

        *self.last_training_error.write().await = None;
        let cancel = CancellationToken::new();
        *self.training_cancel.write().await = Some(cancel.clone());

        self.transition(old_state, ReviewState::Training).await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            project_id = %self.project_id,
            generation,
            "Background training task started"
        );
        self.event_bus.emit_lossy(SiftEvent::TrainingStarted {
            project_id: self.project_id,
            generation,
            timestamp: Utc::now(),
        });

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_training(generation, cancel).await;
        });

        Ok(())
    }

    /// Cancel any in-flight training run (project delete path)
    pub async fn cancel_training(&self) {
        if let Some(cancel) = self.training_cancel.write().await.take() {
            cancel.cancel();
        }
        self.queue.clear().await;
    }

    /// Body of the background training task
    async fn run_training(&self, generation: u64, cancel: CancellationToken) {
        match self.train_once(generation, &cancel).await {
            Ok(TrainingOutcome::Published { n_ranked }) => {
                info!(
                    project_id = %self.project_id,
                    generation,
                    n_ranked,
                    "Training completed, ranking published"
                );
            }
            Ok(TrainingOutcome::Abandoned) => {
                info!(
                    project_id = %self.project_id,
                    generation,
                    "Training abandoned (cancelled or project deleted)"
                );
            }
            Err(message) => {
                warn!(
                    project_id = %self.project_id,
                    generation,
                    error = %message,
                    "Training failed, reverting to setup"
                );
                *self.last_training_error.write().await = Some(message.clone());
                self.revert_to_setup().await;
                self.event_bus.emit_lossy(SiftEvent::TrainingFailed {
                    project_id: self.project_id,
                    error: message,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    async fn train_once(
        &self,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<TrainingOutcome, String> {
        // The project may be deleted at any point while this task runs;
        // every commit is gated on its continued existence.
        let Some(project) = projects::get_project(&self.db, self.project_id)
            .await
            .map_err(|e| e.to_string())?
        else {
            return Ok(TrainingOutcome::Abandoned);
        };

        let docs = documents::all_documents(&self.db, self.project_id)
            .await
            .map_err(|e| e.to_string())?;
        let label_history = labels::get_labeled(&self.db, self.project_id)
            .await
            .map_err(|e| e.to_string())?;

        // The fit is CPU-bound; keep it off the async workers
        let config = project.model_config;
        let ranking = tokio::task::spawn_blocking(move || {
            trainer::train(&docs, &label_history, &config, generation)
        })
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;

        if cancel.is_cancelled()
            || !projects::project_exists(&self.db, self.project_id)
                .await
                .map_err(|e| e.to_string())?
        {
            return Ok(TrainingOutcome::Abandoned);
        }

        let published = self.queue.publish(ranking).await;

        // Only advance if nothing moved the state while we trained
        {
            let mut state = self.state.write().await;
            if *state != ReviewState::Training {
                return Ok(TrainingOutcome::Abandoned);
            }
            *state = ReviewState::Review;
        }
        self.transition(ReviewState::Training, ReviewState::Review)
            .await
            .map_err(|e| e.to_string())?;

        self.event_bus.emit_lossy(SiftEvent::TrainingCompleted {
            project_id: self.project_id,
            generation,
            n_ranked: published.order.len(),
            timestamp: Utc::now(),
        });

        Ok(TrainingOutcome::Published {
            n_ranked: published.order.len(),
        })
    }

    /// Trainer failure path: training → setup, state write-through best effort
    async fn revert_to_setup(&self) {
        {
            let mut state = self.state.write().await;
            if *state != ReviewState::Training {
                return;
            }
            *state = ReviewState::Setup;
        }
        if let Err(e) = self.transition(ReviewState::Training, ReviewState::Setup).await {
            // Project may have been deleted while the trainer was failing
            warn!(
                project_id = %self.project_id,
                error = %e,
                "Could not persist revert to setup"
            );
        }
    }

    /// Next document to present to the reviewer
    ///
    /// `Ok(None)` means the ranking is exhausted (a terminal signal for this
    /// ranking, not an error): the caller retrains or finishes. A project
    /// rehydrated into review after a restart has no published ranking yet;
    /// that case asks the caller to retrain rather than failing.
    pub async fn next_document(&self) -> ApiResult<Option<i64>> {
        let state = self.state().await;
        if !matches!(state, ReviewState::Review | ReviewState::Finished) {
            return Err(ApiError::InvalidState {
                operation: "get_document",
                state,
            });
        }

        let labeled = labels::labeled_doc_ids(&self.db, self.project_id).await?;
        match self.queue.next_unlabeled(&labeled).await {
            NextDocument::Ready(doc_id) => Ok(Some(doc_id)),
            NextDocument::Exhausted => Ok(None),
            NextDocument::NotRanked => Err(ApiError::Precondition(format!(
                "no ranking is available for project {}; start training to rebuild it",
                self.project_id
            ))),
        }
    }
}

/// Lazily-hydrated map of project id to engine
///
/// Per-project state is always looked up by id, never ambient: every handler
/// resolves its engine through here.
#[derive(Clone, Default)]
pub struct ProjectRegistry {
    engines: Arc<RwLock<HashMap<Uuid, Arc<ReviewEngine>>>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created project's engine
    pub async fn insert(&self, engine: Arc<ReviewEngine>) {
        self.engines
            .write()
            .await
            .insert(engine.project_id(), engine);
    }

    /// Resolve the engine for a project, hydrating from the database if
    /// needed. Unknown project ids map to 404.
    pub async fn get(
        &self,
        db: &SqlitePool,
        event_bus: &EventBus,
        project_id: Uuid,
    ) -> ApiResult<Arc<ReviewEngine>> {
        if let Some(engine) = self.engines.read().await.get(&project_id) {
            return Ok(Arc::clone(engine));
        }

        let row = projects::get_project(db, project_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("project {}", project_id)))?;
        let engine = ReviewEngine::hydrate(db.clone(), event_bus.clone(), &row).await?;

        let mut engines = self.engines.write().await;
        let entry = engines.entry(project_id).or_insert(engine);
        Ok(Arc::clone(entry))
    }

    /// Remove a project's engine, cancelling any in-flight training
    pub async fn remove(&self, project_id: Uuid) -> Option<Arc<ReviewEngine>> {
        let engine = self.engines.write().await.remove(&project_id);
        if let Some(engine) = &engine {
            engine.cancel_training().await;
        }
        engine
    }
}

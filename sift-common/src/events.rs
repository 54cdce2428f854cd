//! Event types for the sift event system
//!
//! Events are broadcast over an in-process EventBus and streamed to SSE
//! clients. Emission is lossy: a missing subscriber is never an error.

use crate::models::{LabelDecision, LabelOrigin, ReviewState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Sift event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SiftEvent {
    /// Project created
    ProjectCreated {
        project_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Project deleted (any in-flight training is cancelled)
    ProjectDeleted {
        project_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Label recorded or overwritten
    LabelRecorded {
        project_id: Uuid,
        doc_id: i64,
        decision: LabelDecision,
        origin: LabelOrigin,
        timestamp: DateTime<Utc>,
    },

    /// Background training run started
    TrainingStarted {
        project_id: Uuid,
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Training run completed and a new ranking was published
    TrainingCompleted {
        project_id: Uuid,
        generation: u64,
        n_ranked: usize,
        timestamp: DateTime<Utc>,
    },

    /// Training run failed; state reverted to setup
    TrainingFailed {
        project_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Review state transition
    StateChanged {
        project_id: Uuid,
        old_state: ReviewState,
        new_state: ReviewState,
        timestamp: DateTime<Utc>,
    },
}

impl SiftEvent {
    /// Event type string used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            SiftEvent::ProjectCreated { .. } => "ProjectCreated",
            SiftEvent::ProjectDeleted { .. } => "ProjectDeleted",
            SiftEvent::LabelRecorded { .. } => "LabelRecorded",
            SiftEvent::TrainingStarted { .. } => "TrainingStarted",
            SiftEvent::TrainingCompleted { .. } => "TrainingCompleted",
            SiftEvent::TrainingFailed { .. } => "TrainingFailed",
            SiftEvent::StateChanged { .. } => "StateChanged",
        }
    }
}

/// Broadcast event bus shared by all components
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SiftEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SiftEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the absence of subscribers
    pub fn emit_lossy(&self, event: SiftEvent) {
        let _ = self.tx.send(event);
    }

    /// Channel capacity this bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

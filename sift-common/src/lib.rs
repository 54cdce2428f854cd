//! # Sift Common Library
//!
//! Shared code for the sift screening services including:
//! - Review domain models (states, label decisions, model configuration)
//! - Event types (SiftEvent enum) and the broadcast EventBus
//! - Common error type

pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::{LabelDecision, LabelOrigin, ReviewState};

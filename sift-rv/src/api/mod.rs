//! HTTP API handlers

pub mod algorithms;
pub mod health;
pub mod progress;
pub mod projects;
pub mod review;
pub mod sse;

pub use algorithms::algorithm_routes;
pub use health::health_routes;
pub use progress::progress_routes;
pub use projects::project_routes;
pub use review::review_routes;
pub use sse::event_stream;

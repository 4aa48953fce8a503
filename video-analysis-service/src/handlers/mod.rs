//! HTTP handlers for the video analysis service.

pub mod analysis;
pub mod health;

pub use analysis::{analyze_video, AnalysisError};
pub use health::{health_check, metrics_endpoint, readiness_check};

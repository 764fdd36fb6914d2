//! Error types for pools, caches and the resource tracker

use crate::tracker::ResourceId;
use thiserror::Error;

/// Errors reported by the lifecycle core.
///
/// None of these are fatal. Operations on hot paths log and fall back to a
/// safe default; the `Result` returning variants exist for callers that want
/// to know what was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Pool capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    #[error("Cache bound `{bound}` must be at least 1, got {value}")]
    InvalidCacheBound { bound: &'static str, value: usize },

    #[error(
        "Memory thresholds must satisfy 0 <= warning < critical < emergency <= 100, got {warning}/{critical}/{emergency}"
    )]
    InvalidThresholds {
        warning: f64,
        critical: f64,
        emergency: f64,
    },

    #[error("Frame interval must be at least 1")]
    InvalidInterval(u32),

    #[error("Resource {0} is not tracked")]
    UnknownResource(ResourceId),

    #[error("Cleanup of resource {id} panicked: {message}")]
    CleanupPanicked { id: ResourceId, message: String },

    #[error("Metrics export failed: {0}")]
    Metrics(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(feature = "metrics")]
impl From<prometheus::Error> for LifecycleError {
    fn from(err: prometheus::Error) -> Self {
        LifecycleError::Metrics(err.to_string())
    }
}

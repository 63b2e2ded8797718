//! Routing error types.

use thiserror::Error;

/// Errors raised while setting up routing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    /// Thresholds must satisfy `0 <= low <= high <= 1`.
    #[error("invalid confidence thresholds: low={low}, high={high}")]
    InvalidThresholds { low: f32, high: f32 },
}

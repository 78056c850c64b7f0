//! Library error types

use thiserror::Error;

/// Errors raised at the metrics-backend boundary.
///
/// Transport and decode failures are transient: callers degrade the affected
/// metric to zero and continue. Only a failed startup health check is fatal.
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("metrics backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("metrics backend rejected query: {0}")]
    Backend(String),

    #[error("failed to decode metrics response: {0}")]
    Decode(String),

    #[error("invalid metrics backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

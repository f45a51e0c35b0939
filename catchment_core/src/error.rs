//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

/// Errors raised while routing, scoring or improving catchment boundaries.
#[derive(Debug, Error)]
pub enum CatchmentError {
    /// No valid route or candidate could be produced. Callers skip the
    /// candidate and carry on.
    #[error("routing failed: {0}")]
    Routing(String),
    /// The mesh, water network or dataset disagree with each other.
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),
    /// The caller broke an input contract (empty input, bad radius, NaN).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The run was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse geojson: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl CatchmentError {
    /// Returns `true` for failures that only invalidate the current candidate.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CatchmentError::Routing(_))
    }

    pub(crate) fn routing(msg: impl Into<String>) -> Self {
        CatchmentError::Routing(msg.into())
    }

    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        CatchmentError::DataInconsistency(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CatchmentError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CatchmentError>;

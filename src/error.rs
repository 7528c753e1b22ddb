//! Error taxonomy.
//!
//! Input and model-fit errors abort a run before anything is persisted; review
//! conflicts and degenerate geometry are local and leave the rest of the run
//! untouched.
use crate::anomaly::ReviewDecision;
use thiserror::Error;
use uuid::Uuid;

/// The depth grid cannot be processed at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("depth grid has no cells")]
    Empty,
    #[error("grid {rows}x{cols} is smaller than the {min}x{min} feature window")]
    GridTooSmall { rows: usize, cols: usize, min: usize },
    #[error("{what} has {actual} samples, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("every cell of the depth grid is no-data")]
    AllNoData,
    #[error("cell size must be finite and positive, got {0}")]
    InvalidResolution(f64),
}

/// Fatal run errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QcError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),
    #[error("invalid run config: {0}")]
    Config(String),
    #[error("model fit failed: {0}")]
    ModelFit(String),
    #[error("run {0} was cancelled")]
    Cancelled(Uuid),
}

impl QcError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QcError::Cancelled(_))
    }
}

/// Recoverable errors returned by the review ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReviewError {
    #[error("anomaly {anomaly_id} is already {current}")]
    Conflict {
        anomaly_id: Uuid,
        current: ReviewDecision,
    },
    #[error("unknown anomaly {0}")]
    UnknownAnomaly(Uuid),
    #[error("unknown run {0}")]
    UnknownRun(Uuid),
    #[error("a review must accept or reject the anomaly")]
    PendingNotAllowed,
}

/// A labelled component could not be turned into a usable polygon.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("component {label} dropped: {reason}")]
    Degenerate { label: usize, reason: String },
}

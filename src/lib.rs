#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod anomaly;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod pipeline;
pub mod review;

// Stage modules: public for tools and tests, considered internals.
pub mod detect;
pub mod features;
pub mod polygon;
pub mod raster;
pub mod scoring;

// --- High-level re-exports -------------------------------------------------

pub use crate::anomaly::{Anomaly, AnomalyType, ConfidenceTier, Explanation, ReviewDecision};
pub use crate::config::{FrozenConfig, RunConfig};
pub use crate::error::{GeometryError, InputError, QcError, ReviewError};
pub use crate::grid::{DepthGrid, GeoTransform};
pub use crate::pipeline::{
    CancelToken, QcPipeline, QcStore, RunJob, RunOutput, RunRecord, RunStatus, RunSummary,
};
pub use crate::review::{ReviewLedger, ReviewLogEntry};

// --- Prelude ---------------------------------------------------------------

/// Everything needed to run a survey and review its anomalies.
pub mod prelude {
    pub use crate::{
        Anomaly, AnomalyType, CancelToken, ConfidenceTier, DepthGrid, GeoTransform, QcError,
        QcPipeline, QcStore, ReviewDecision, RunConfig,
    };
}

// --- Stage-level API (for tools & advanced users) --------------------------

pub mod stages {
    pub use crate::detect::{DetectorEnsemble, DetectorKind, ScoreGrid};
    pub use crate::features::{extract_features, FeatureKind, FeatureSet};
    pub use crate::polygon::{AnomalyDraft, PolygonizeOutput, Polygonizer};
    pub use crate::scoring::{confidence_tier, qc_priorities, rank_by_priority};

    pub use crate::diagnostics::{RunTrace, StageTiming, TimingBreakdown};
}

//! Run diagnostics: stage timings and the per-run trace.
//!
//! A [`RunTrace`] travels with every completed run. It records how long each
//! stage took, how many cells the detectors saw and what the polygonizer
//! discarded, including dropped degenerate geometry.
pub mod timing;
pub mod trace;

pub use timing::{StageTiming, TimingBreakdown};
pub use trace::{DetectionStage, GeometryWarning, InputDescriptor, PolygonStage, RunTrace};

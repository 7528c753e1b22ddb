//! QC pipeline orchestrating one run end to end.
//!
//! [`QcPipeline`] takes a validated [`FrozenConfig`] and a [`DepthGrid`] and
//! returns the ranked anomaly set together with the rasters the export layer
//! needs. Every run gets a fresh [`RunContext`]; fitted detectors live only
//! inside it and are dropped with it.
//!
//! Typical usage:
//! ```no_run
//! use bathy_qc::{DepthGrid, QcPipeline, RunConfig};
//!
//! # fn example(grid: DepthGrid) -> Result<(), bathy_qc::QcError> {
//! let pipeline = QcPipeline::new(RunConfig::default().frozen()?);
//! let output = pipeline.run(&grid)?;
//! for anomaly in output.anomalies.iter().take(5) {
//!     println!("{} p={:.2} priority={:.2}", anomaly.anomaly_type, anomaly.probability, anomaly.qc_priority);
//! }
//! # Ok(())
//! # }
//! ```

// Stages
// - Admission: the grid must hold at least one full feature window.
// - Features: windowed statistics and derivative kernels (`features`).
// - Detect: isolation forest, robust detector, spatial term, fusion (`detect`).
// - Polygonize: threshold, label, trace, classify, explain (`polygon`).
// - Score: confidence tiers, QC priority and review order (`scoring`).
//
// Cancellation is checked between stages. A cancelled or failed run returns
// an error and nothing it computed escapes.
//
// Submodules
// - `run`: status, record and summary types.
// - `job`: background execution with a pollable status.
// - `store`: completed runs, queries and the review ledger.
mod job;
mod run;
mod store;

pub use job::RunJob;
pub use run::{RunRecord, RunStatus, RunSummary};
pub use store::QcStore;

use crate::anomaly::{Anomaly, ReviewDecision};
use crate::config::{FrozenConfig, RunConfig, MODEL_VERSION};
use crate::detect::{DetectorEnsemble, ScoreGrid};
use crate::diagnostics::{
    DetectionStage, GeometryWarning, InputDescriptor, PolygonStage, RunTrace, TimingBreakdown,
};
use crate::diagnostics::timing::elapsed_ms;
use crate::error::QcError;
use crate::features::{extract_features, FeatureSet};
use crate::grid::DepthGrid;
use crate::polygon::{AnomalyDraft, Polygonizer};
use crate::scoring::{confidence_tier, qc_priorities, rank_by_priority, PriorityInput};
use chrono::Utc;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Shared flag used to cancel a run from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a completed run.
#[derive(Clone, Debug)]
pub struct RunOutput {
    pub record: RunRecord,
    /// Sorted by QC priority, highest first.
    pub anomalies: Vec<Anomaly>,
    pub scores: ScoreGrid,
    pub features: FeatureSet,
    pub trace: RunTrace,
}

impl RunOutput {
    pub fn summary(&self) -> &RunSummary {
        &self.record.summary
    }
}

#[derive(Clone, Debug)]
pub struct QcPipeline {
    config: FrozenConfig,
}

impl QcPipeline {
    pub fn new(config: FrozenConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrozenConfig {
        &self.config
    }

    /// Run with a fresh id and no cancellation.
    pub fn run(&self, grid: &DepthGrid) -> Result<RunOutput, QcError> {
        self.run_with_cancel(Uuid::new_v4(), grid, &CancelToken::new())
    }

    pub fn run_with_cancel(
        &self,
        run_id: Uuid,
        grid: &DepthGrid,
        cancel: &CancelToken,
    ) -> Result<RunOutput, QcError> {
        info!(
            "run {run_id} started grid={}x{} config={}",
            grid.rows(),
            grid.cols(),
            self.config.config_hash()
        );
        let ctx = RunContext {
            run_id,
            config: &self.config,
            cancel,
            record: self.pending_record(run_id),
        };
        let output = ctx.execute(grid)?;
        info!(
            "run {run_id} completed anomalies={} high={} in {:.1} ms",
            output.record.summary.total, output.record.summary.high, output.trace.timings.total_ms
        );
        Ok(output)
    }

    pub(crate) fn pending_record(&self, run_id: Uuid) -> RunRecord {
        RunRecord {
            id: run_id,
            status: RunStatus::Pending,
            config_hash: self.config.config_hash().to_string(),
            config: self.config.config().clone(),
            model_version: MODEL_VERSION.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            summary: RunSummary::default(),
        }
    }
}

/// State owned by a single run; built per call and consumed by it.
struct RunContext<'a> {
    run_id: Uuid,
    config: &'a FrozenConfig,
    cancel: &'a CancelToken,
    record: RunRecord,
}

impl RunContext<'_> {
    fn checkpoint(&self) -> Result<(), QcError> {
        if self.cancel.is_cancelled() {
            info!("run {} cancelled, discarding partial output", self.run_id);
            return Err(QcError::Cancelled(self.run_id));
        }
        Ok(())
    }

    fn execute(mut self, grid: &DepthGrid) -> Result<RunOutput, QcError> {
        let total_start = Instant::now();
        let config = self.config.config();
        let mut timings = TimingBreakdown::default();
        self.record.status = RunStatus::Processing;

        let radius = config.features.window_radius;
        grid.check_window(radius)?;
        self.checkpoint()?;

        let features = timings.record("features", || extract_features(grid, radius));
        self.checkpoint()?;

        let scores =
            timings.record("detect", || DetectorEnsemble::new(config).score(grid, &features))?;
        self.checkpoint()?;

        let polygons = timings.record("polygonize", || {
            Polygonizer::new(config).polygonize(grid, &features, &scores)
        });
        self.checkpoint()?;

        let score_start = Instant::now();
        let mut anomalies = assemble(self.run_id, polygons.drafts, config);
        rank_by_priority(&mut anomalies);
        timings.push("score", elapsed_ms(score_start));
        timings.total_ms = elapsed_ms(total_start);

        let threshold = config.polygon.detection_threshold;
        let trace = RunTrace {
            input: InputDescriptor {
                rows: grid.rows(),
                cols: grid.cols(),
                cell_size: grid.cell_size(),
                crs: grid.crs().to_string(),
                stats: grid.stats().clone(),
            },
            timings,
            detection: DetectionStage {
                fit_cells: features.valid_count(),
                cells_above_threshold: scores
                    .fused()
                    .data
                    .iter()
                    .filter(|&&v| v.is_finite() && v as f64 > threshold)
                    .count(),
            },
            polygons: PolygonStage {
                components: polygons.components,
                below_min_pixels: polygons.below_min_pixels,
                coverage_gaps: polygons.gap_components,
                anomalies: anomalies.len(),
                warnings: polygons.warnings.iter().map(GeometryWarning::from).collect(),
            },
        };

        self.record.summary = RunSummary::from_anomalies(&anomalies);
        self.record.finish(RunStatus::Completed, None);
        debug!(
            "run {} stages={:?}",
            self.run_id,
            trace
                .timings
                .stages
                .iter()
                .map(|s| (s.label.as_str(), s.elapsed_ms))
                .collect::<Vec<_>>()
        );
        Ok(RunOutput {
            record: self.record,
            anomalies,
            scores,
            features,
            trace,
        })
    }
}

/// Give drafts their identity, tier and priority, in polygonizer order.
fn assemble(run_id: Uuid, drafts: Vec<AnomalyDraft>, config: &RunConfig) -> Vec<Anomaly> {
    let inputs: Vec<PriorityInput> = drafts
        .iter()
        .map(|d| PriorityInput {
            probability: d.probability,
            depth_std: d.depth_std,
            pixel_count: d.pixel_count,
        })
        .collect();
    let priorities = qc_priorities(&inputs, &config.priority);
    let created_at = Utc::now();
    drafts
        .into_iter()
        .zip(priorities)
        .enumerate()
        .map(|(sequence, (draft, qc_priority))| Anomaly {
            id: Uuid::new_v4(),
            run_id,
            sequence: sequence as u64,
            confidence: confidence_tier(draft.probability, &config.confidence),
            polygon: draft.polygon,
            centroid: draft.centroid,
            pixel_count: draft.pixel_count,
            area: draft.area,
            anomaly_type: draft.anomaly_type,
            probability: draft.probability,
            qc_priority,
            explanation: draft.explanation,
            local_depth_mean: draft.depth_mean,
            local_depth_std: draft.depth_std,
            decision: ReviewDecision::Pending,
            created_at,
        })
        .collect()
}

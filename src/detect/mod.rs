//! Detector ensemble: per-cell anomaly scores fused into a [`ScoreGrid`].
//!
//! Modules
//! - [`forest`] – isolation forest fitted on this survey's feature vectors.
//! - [`robust`] – MAD-based modified z-score of the depth residual.
//! - [`spatial`] – neighbour agreement that damps isolated single-cell hits.
//!
//! Key Ideas
//! - The forest sees magnitude features only (|z|, slope, curvature,
//!   roughness, |Laplacian|, neighbour std); absolute depth is left out so a
//!   deep basin is not an anomaly by itself.
//! - The spatial term is computed from `max(isolation, robust)` so either
//!   detector can corroborate its neighbours.
//! - The fitted forest lives on the stack of [`DetectorEnsemble::score`] and
//!   is dropped with it; nothing is shared between runs.
pub mod forest;
pub mod robust;
pub mod spatial;

use self::forest::{IsolationForest, Sample};
use self::robust::robust_scores;
use self::spatial::spatial_consistency;
use crate::config::RunConfig;
use crate::error::QcError;
use crate::features::{FeatureKind, FeatureSet};
use crate::grid::DepthGrid;
use crate::raster::Raster;
use log::debug;
use serde::Serialize;

/// Which detector contributed to a finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    IsolationForest,
    RobustZScore,
    SpatialConsistency,
    /// No-data cluster enclosed by valid coverage.
    CoverageGap,
}

impl DetectorKind {
    pub const CELL_DETECTORS: [DetectorKind; 3] = [
        DetectorKind::IsolationForest,
        DetectorKind::RobustZScore,
        DetectorKind::SpatialConsistency,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DetectorKind::IsolationForest => "isolation_forest",
            DetectorKind::RobustZScore => "robust_zscore",
            DetectorKind::SpatialConsistency => "spatial_consistency",
            DetectorKind::CoverageGap => "coverage_gap",
        }
    }
}

/// Fused and per-detector scores, `NaN` wherever features are no-data.
#[derive(Clone, Debug)]
pub struct ScoreGrid {
    fused: Raster,
    isolation: Raster,
    robust: Raster,
    spatial: Raster,
}

impl ScoreGrid {
    pub(crate) fn from_layers(
        fused: Raster,
        isolation: Raster,
        robust: Raster,
        spatial: Raster,
    ) -> Self {
        Self {
            fused,
            isolation,
            robust,
            spatial,
        }
    }

    pub fn rows(&self) -> usize {
        self.fused.rows
    }

    pub fn cols(&self) -> usize {
        self.fused.cols
    }

    /// Fused score in `[0, 1]`.
    pub fn fused(&self) -> &Raster {
        &self.fused
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.fused.get(row, col)
    }

    /// Per-detector layer; `None` for detectors that do not score cells.
    pub fn detector(&self, kind: DetectorKind) -> Option<&Raster> {
        match kind {
            DetectorKind::IsolationForest => Some(&self.isolation),
            DetectorKind::RobustZScore => Some(&self.robust),
            DetectorKind::SpatialConsistency => Some(&self.spatial),
            DetectorKind::CoverageGap => None,
        }
    }

    /// Row-major fused scores with no-data replaced by `fill`.
    pub fn to_export_values(&self, fill: f32) -> Vec<f32> {
        self.fused.filled_nodata(fill)
    }
}

pub struct DetectorEnsemble<'a> {
    config: &'a RunConfig,
}

impl<'a> DetectorEnsemble<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Fit the detectors on this survey and score every valid feature cell.
    pub fn score(&self, grid: &DepthGrid, features: &FeatureSet) -> Result<ScoreGrid, QcError> {
        let (rows, cols) = (features.rows(), features.cols());
        let cells: Vec<usize> = (0..rows * cols).filter(|&i| features.is_valid(i)).collect();

        let samples: Vec<Sample> = cells.iter().map(|&i| forest_sample(features, i)).collect();
        let forest = IsolationForest::fit(&samples, &self.config.forest)?;
        let iso = forest.isolation_scores(&samples);

        let depths = grid.depths();
        let neighbor_mean = features.get(FeatureKind::NeighborMean);
        let residuals: Vec<f64> = cells
            .iter()
            .map(|&i| depths.data[i] as f64 - neighbor_mean.data[i] as f64)
            .collect();
        let robust = robust_scores(&residuals, self.config.robust.mad_threshold);

        let mut isolation = Raster::nodata(rows, cols);
        let mut robust_layer = Raster::nodata(rows, cols);
        let mut preliminary = Raster::nodata(rows, cols);
        for (k, &i) in cells.iter().enumerate() {
            isolation.data[i] = iso[k] as f32;
            robust_layer.data[i] = robust[k] as f32;
            preliminary.data[i] = iso[k].max(robust[k]) as f32;
        }
        let spatial = spatial_consistency(&preliminary);

        let w = &self.config.fusion;
        let mut fused = Raster::nodata(rows, cols);
        for &i in &cells {
            let s = w.isolation * isolation.data[i] as f64
                + w.robust * robust_layer.data[i] as f64
                + w.spatial * spatial.data[i] as f64;
            fused.data[i] = s.clamp(0.0, 1.0) as f32;
        }

        debug!(
            "DetectorEnsemble::score cells={} forest_sample={} max_fused={:.3}",
            cells.len(),
            forest.sample_size(),
            cells
                .iter()
                .map(|&i| fused.data[i])
                .fold(0.0f32, f32::max)
        );
        Ok(ScoreGrid::from_layers(fused, isolation, robust_layer, spatial))
    }
}

fn forest_sample(features: &FeatureSet, idx: usize) -> Sample {
    let v = |kind: FeatureKind| features.get(kind).data[idx] as f64;
    [
        v(FeatureKind::LocalZScore).abs(),
        v(FeatureKind::Slope),
        v(FeatureKind::Curvature),
        v(FeatureKind::Roughness),
        v(FeatureKind::Laplacian).abs(),
        v(FeatureKind::NeighborStd),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::extract_features;
    use crate::grid::GeoTransform;

    fn grid(rows: usize, cols: usize, depths: Vec<f32>) -> DepthGrid {
        let n = rows * cols;
        DepthGrid::new(rows, cols, depths, vec![false; n], GeoTransform::new(0.0, 0.0, 1.0), "")
            .unwrap()
    }

    #[test]
    fn flat_survey_scores_zero() {
        let g = grid(20, 20, vec![5.0; 400]);
        let cfg = RunConfig::default();
        let fs = extract_features(&g, 2);
        let scores = DetectorEnsemble::new(&cfg).score(&g, &fs).unwrap();
        for i in 0..400 {
            let v = scores.fused().data[i];
            if fs.is_valid(i) {
                assert_eq!(v, 0.0, "cell {i}");
            } else {
                assert!(v.is_nan(), "cell {i}");
            }
        }
    }

    #[test]
    fn too_small_population_is_a_fit_error() {
        let g = grid(8, 8, vec![5.0; 64]);
        let cfg = RunConfig::default();
        let fs = extract_features(&g, 2);
        let err = DetectorEnsemble::new(&cfg).score(&g, &fs).unwrap_err();
        assert!(matches!(err, QcError::ModelFit(_)), "{err:?}");
    }

    #[test]
    fn spike_footprint_outscores_background() {
        let n = 30;
        let mut depths = vec![10.0f32; n * n];
        depths[15 * n + 15] = 1000.0;
        let g = grid(n, n, depths);
        let cfg = RunConfig::default();
        let fs = extract_features(&g, 2);
        let scores = DetectorEnsemble::new(&cfg).score(&g, &fs).unwrap();

        assert!(scores.get(15, 15) > 0.6, "spike score {}", scores.get(15, 15));
        assert_eq!(scores.get(5, 5), 0.0);
        let robust = scores.detector(DetectorKind::RobustZScore).unwrap();
        assert_eq!(robust.get(15, 15), 1.0);
        assert_eq!(robust.get(14, 16), 1.0);
        assert!(scores.detector(DetectorKind::CoverageGap).is_none());

        let export = scores.to_export_values(-9999.0);
        assert_eq!(export[0], -9999.0);
        assert_eq!(export[15 * n + 15], scores.get(15, 15));
    }
}

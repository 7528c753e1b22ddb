//! Per-cell feature extraction over a square window.
//!
//! Overview
//! - Windowed statistics (local z-score, roughness, neighbour mean/std) are
//!   computed from the valid cells of a `(2r+1)²` window; no-data neighbours
//!   are skipped.
//! - Slope, curvature and the Laplacian come from 3×3 kernels (see
//!   `kernels`).
//! - Cells within `r` of the border and no-data cells are `NaN` in every
//!   layer, so all layers share one validity mask.
//!
//! The extraction is a pure function of the grid and the radius.
mod kernels;
pub(crate) mod window;

use self::kernels::Derivatives;
use self::window::window_stats;
use crate::grid::DepthGrid;
use crate::raster::Raster;
use log::debug;
use rayon::prelude::*;
use serde::Serialize;

/// Floor applied to the local standard deviation in the z-score.
pub const STD_EPSILON: f64 = 1e-6;

pub const FEATURE_COUNT: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    LocalZScore,
    Slope,
    Curvature,
    Roughness,
    Laplacian,
    NeighborMean,
    NeighborStd,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; FEATURE_COUNT] = [
        FeatureKind::LocalZScore,
        FeatureKind::Slope,
        FeatureKind::Curvature,
        FeatureKind::Roughness,
        FeatureKind::Laplacian,
        FeatureKind::NeighborMean,
        FeatureKind::NeighborStd,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::LocalZScore => "z_score",
            FeatureKind::Slope => "slope",
            FeatureKind::Curvature => "curvature",
            FeatureKind::Roughness => "roughness",
            FeatureKind::Laplacian => "laplacian",
            FeatureKind::NeighborMean => "neighbor_mean",
            FeatureKind::NeighborStd => "neighbor_std",
        }
    }
}

/// Feature layers congruent with the source grid.
#[derive(Clone, Debug)]
pub struct FeatureSet {
    radius: usize,
    rows: usize,
    cols: usize,
    valid: Vec<bool>,
    layers: Vec<Raster>,
}

impl FeatureSet {
    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major layer for `kind`, `NaN` at no-data.
    pub fn get(&self, kind: FeatureKind) -> &Raster {
        &self.layers[kind.index()]
    }

    /// Cells carrying a full feature vector.
    pub fn valid_mask(&self) -> &[bool] {
        &self.valid
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        self.valid[idx]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Feature vector of one cell in [`FeatureKind::ALL`] order.
    pub fn vector(&self, idx: usize) -> [f32; FEATURE_COUNT] {
        let mut out = [f32::NAN; FEATURE_COUNT];
        for (slot, layer) in out.iter_mut().zip(&self.layers) {
            *slot = layer.data[idx];
        }
        out
    }

    /// Mean of a layer over all valid cells.
    pub fn population_mean(&self, kind: FeatureKind) -> f64 {
        let layer = self.get(kind);
        let (sum, n) = self
            .valid
            .iter()
            .zip(&layer.data)
            .filter(|(ok, _)| **ok)
            .fold((0.0f64, 0usize), |(s, n), (_, &v)| (s + v as f64, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }
}

/// Compute every feature layer for `grid` with a window of radius `radius`.
pub fn extract_features(grid: &DepthGrid, radius: usize) -> FeatureSet {
    let (rows, cols) = (grid.rows(), grid.cols());
    let depths = grid.depths();
    let src_valid = grid.valid_mask();

    let interior = |r: usize, c: usize| {
        r >= radius && c >= radius && r + radius < rows && c + radius < cols
    };
    let valid: Vec<bool> = (0..rows * cols)
        .map(|i| src_valid[i] && interior(i / cols, i % cols))
        .collect();

    let deriv = Derivatives::compute(depths, src_valid, grid.cell_size());

    let per_row: Vec<Vec<[f32; FEATURE_COUNT]>> = (0..rows)
        .into_par_iter()
        .map(|r| {
            (0..cols)
                .map(|c| {
                    let i = r * cols + c;
                    if !valid[i] {
                        return [f32::NAN; FEATURE_COUNT];
                    }
                    let w = window_stats(depths, src_valid, r, c, radius);
                    let v = depths.data[i] as f64;
                    let z = (v - w.mean) / w.std.max(STD_EPSILON);
                    [
                        z as f32,
                        deriv.slope.data[i],
                        deriv.curvature.data[i],
                        w.std as f32,
                        deriv.laplacian.data[i],
                        w.neighbor_mean as f32,
                        w.neighbor_std as f32,
                    ]
                })
                .collect()
        })
        .collect();

    let mut layers: Vec<Raster> = (0..FEATURE_COUNT)
        .map(|_| Raster::nodata(rows, cols))
        .collect();
    for (r, row) in per_row.iter().enumerate() {
        for (c, vector) in row.iter().enumerate() {
            let i = r * cols + c;
            for (layer, &v) in layers.iter_mut().zip(vector) {
                layer.data[i] = v;
            }
        }
    }

    let set = FeatureSet {
        radius,
        rows,
        cols,
        valid,
        layers,
    };
    debug!(
        "extract_features rows={} cols={} radius={} feature_cells={}",
        rows,
        cols,
        radius,
        set.valid_count()
    );
    set
}

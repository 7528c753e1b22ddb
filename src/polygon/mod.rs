//! Polygonizer: turns a score grid into explained anomaly regions.
//!
//! Overview
//! - Binarises the fused score (`score > detection_threshold`), labels
//!   connected components and drops those below `min_pixels`.
//! - Traces each surviving component along cell edges, converts the ring to
//!   world coordinates and simplifies it with Douglas–Peucker. A ring that
//!   degenerates is dropped with a [`GeometryError`]; the run continues.
//! - Summarises each region (feature means, detector means, shape) into a
//!   signature that drives both the type label and the explanation.
//! - Separately labels no-data clusters; those enclosed by valid coverage
//!   become `hole` regions.
//!
//! Modules
//! - [`label`] – connected components with region moments.
//! - [`trace`] – outer-ring tracing on the cell-corner lattice.
//! - [`simplify`] – Douglas–Peucker for closed rings.
//! - `classify` – signatures, type labels and explanations.
//!
//! Output order is deterministic: score regions in raster order of their
//! first cell, then holes in the same order.
mod classify;
pub mod label;
pub mod simplify;
pub mod trace;

use self::classify::{classify, explain, explain_gap, lift, RegionSignature};
use self::label::{label_components, Component};
use self::simplify::{ring_area, simplify_ring, Point};
use self::trace::trace_outer_ring;
use crate::anomaly::{AnomalyType, Explanation, Polygon};
use crate::config::{Connectivity, RunConfig};
use crate::detect::{DetectorKind, ScoreGrid};
use crate::error::GeometryError;
use crate::features::window::Moments;
use crate::features::{FeatureKind, FeatureSet};
use crate::grid::DepthGrid;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Rings enclosing less than this fraction of one cell are degenerate.
const MIN_AREA_CELLS: f64 = 1e-6;

/// Region found by the polygonizer, before ids, tiers and priorities.
#[derive(Clone, Debug, PartialEq)]
pub struct AnomalyDraft {
    pub polygon: Polygon,
    pub centroid: [f64; 2],
    pub pixel_count: usize,
    pub area: f64,
    pub anomaly_type: AnomalyType,
    pub probability: f64,
    pub explanation: Explanation,
    pub depth_mean: f64,
    pub depth_std: f64,
}

#[derive(Clone, Debug, Default)]
pub struct PolygonizeOutput {
    pub drafts: Vec<AnomalyDraft>,
    pub warnings: Vec<GeometryError>,
    pub components: usize,
    pub below_min_pixels: usize,
    pub gap_components: usize,
}

pub struct Polygonizer<'a> {
    config: &'a RunConfig,
}

impl<'a> Polygonizer<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    pub fn polygonize(
        &self,
        grid: &DepthGrid,
        features: &FeatureSet,
        scores: &ScoreGrid,
    ) -> PolygonizeOutput {
        let opts = &self.config.polygon;
        let (rows, cols) = (grid.rows(), grid.cols());
        let threshold = opts.detection_threshold;
        let fused = scores.fused();
        let mask: Vec<bool> = fused
            .data
            .iter()
            .map(|&v| v.is_finite() && v as f64 > threshold)
            .collect();

        let mut out = PolygonizeOutput::default();
        let population = PopulationMeans::new(features);
        for comp in label_components(&mask, rows, cols, opts.connectivity) {
            out.components += 1;
            if comp.cells.len() < opts.min_pixels {
                out.below_min_pixels += 1;
                continue;
            }
            let polygon = match self.outline(&comp, grid) {
                Ok(p) => p,
                Err(err) => {
                    warn!("{err}");
                    out.warnings.push(err);
                    continue;
                }
            };
            let sig = signature(&comp, features, scores, &population);
            let depth = depth_moments(grid, comp.cells.iter().copied());
            out.drafts.push(AnomalyDraft {
                polygon,
                centroid: centroid(grid, &comp.cells),
                pixel_count: comp.cells.len(),
                area: comp.cells.len() as f64 * grid.cell_size() * grid.cell_size(),
                anomaly_type: classify(&sig, self.config),
                probability: fused.mean_over(&comp.cells).unwrap_or(0.0),
                explanation: explain(&sig, self.config),
                depth_mean: depth.mean().unwrap_or(f64::NAN),
                depth_std: depth.std().unwrap_or(0.0),
            });
        }

        self.collect_gaps(grid, &mut out);
        debug!(
            "Polygonizer::polygonize components={} below_min={} gaps={} drafts={} warnings={}",
            out.components,
            out.below_min_pixels,
            out.gap_components,
            out.drafts.len(),
            out.warnings.len()
        );
        out
    }

    fn collect_gaps(&self, grid: &DepthGrid, out: &mut PolygonizeOutput) {
        let opts = &self.config.polygon;
        let (rows, cols) = (grid.rows(), grid.cols());
        let nodata: Vec<bool> = grid.valid_mask().iter().map(|&v| !v).collect();
        for comp in label_components(&nodata, rows, cols, Connectivity::Eight) {
            if comp.cells.len() < opts.min_pixels {
                continue;
            }
            let ring = surrounding_ring(&comp.cells, rows, cols);
            let valid_ring: Vec<usize> = ring
                .iter()
                .filter_map(|&cell| cell)
                .filter(|&i| grid.valid_mask()[i])
                .collect();
            let enclosure = if ring.is_empty() {
                0.0
            } else {
                valid_ring.len() as f64 / ring.len() as f64
            };
            if enclosure < opts.gap_min_enclosure {
                continue;
            }
            out.gap_components += 1;
            let polygon = match self.outline(&comp, grid) {
                Ok(p) => p,
                Err(err) => {
                    warn!("{err}");
                    out.warnings.push(err);
                    continue;
                }
            };
            let depth = depth_moments(grid, valid_ring.iter().copied());
            let (ring_mean, ring_std) = (
                depth.mean().unwrap_or(f64::NAN),
                depth.std().unwrap_or(0.0),
            );
            out.drafts.push(AnomalyDraft {
                polygon,
                centroid: centroid(grid, &comp.cells),
                pixel_count: comp.cells.len(),
                area: comp.cells.len() as f64 * grid.cell_size() * grid.cell_size(),
                anomaly_type: AnomalyType::Hole,
                probability: enclosure,
                explanation: explain_gap(
                    enclosure,
                    comp.cells.len(),
                    ring_mean,
                    ring_std,
                    self.config,
                ),
                depth_mean: ring_mean,
                depth_std: ring_std,
            });
        }
    }

    /// Traced, simplified outer ring in world coordinates (counter-clockwise).
    fn outline(&self, comp: &Component, grid: &DepthGrid) -> Result<Polygon, GeometryError> {
        let transform = grid.transform();
        let cell = grid.cell_size();
        let lattice = trace_outer_ring(&comp.cells, grid.cols());
        let mut ring: Vec<Point> = lattice
            .iter()
            .map(|&(r, c)| transform.corner(r as f64, c as f64))
            .collect();
        if ring_area(&ring) < 0.0 {
            ring.reverse();
        }
        let simplified = simplify_ring(&ring, self.config.polygon.simplify_tolerance * cell);
        let degenerate = |reason: String| GeometryError::Degenerate {
            label: comp.label,
            reason,
        };
        if simplified.len() < 3 {
            return Err(degenerate(format!(
                "{} vertices left after simplification",
                simplified.len()
            )));
        }
        let area = ring_area(&simplified);
        if area <= MIN_AREA_CELLS * cell * cell {
            return Err(degenerate(format!("ring area {area:.3e} after simplification")));
        }
        Ok(Polygon {
            exterior: simplified,
        })
    }
}

struct PopulationMeans {
    slope: f64,
    roughness: f64,
}

impl PopulationMeans {
    fn new(features: &FeatureSet) -> Self {
        Self {
            slope: features.population_mean(FeatureKind::Slope),
            roughness: features.population_mean(FeatureKind::Roughness),
        }
    }
}

fn signature(
    comp: &Component,
    features: &FeatureSet,
    scores: &ScoreGrid,
    population: &PopulationMeans,
) -> RegionSignature {
    let mean_of = |kind: FeatureKind| features.get(kind).mean_over(&comp.cells).unwrap_or(0.0);
    let feature_means: BTreeMap<String, f64> = FeatureKind::ALL
        .iter()
        .map(|&kind| (kind.name().to_string(), mean_of(kind)))
        .collect();
    let z = features.get(FeatureKind::LocalZScore);
    let peak_abs_z = comp
        .cells
        .iter()
        .map(|&i| z.data[i].abs() as f64)
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);
    let detector_means = DetectorKind::CELL_DETECTORS
        .iter()
        .filter_map(|&kind| {
            let layer = scores.detector(kind)?;
            Some((kind, layer.mean_over(&comp.cells).unwrap_or(0.0)))
        })
        .collect();
    RegionSignature {
        slope_lift: lift(mean_of(FeatureKind::Slope), population.slope),
        roughness_lift: lift(mean_of(FeatureKind::Roughness), population.roughness),
        feature_means,
        peak_abs_z,
        elongation: comp.elongation,
        detector_means,
    }
}

fn centroid(grid: &DepthGrid, cells: &[usize]) -> [f64; 2] {
    let cols = grid.cols();
    let n = cells.len().max(1) as f64;
    let (sx, sy) = cells.iter().fold((0.0, 0.0), |(sx, sy), &i| {
        let [x, y] = grid.transform().cell_center(i / cols, i % cols);
        (sx + x, sy + y)
    });
    [sx / n, sy / n]
}

fn depth_moments(grid: &DepthGrid, cells: impl Iterator<Item = usize>) -> Moments {
    let depths = grid.depths();
    let mut m = Moments::new();
    for i in cells {
        if grid.valid_mask()[i] {
            m.push(depths.data[i] as f64);
        }
    }
    m
}

/// The 8-neighbour ring around `cells`, one entry per distinct position.
/// Positions outside the grid are `None`.
fn surrounding_ring(cells: &[usize], rows: usize, cols: usize) -> Vec<Option<usize>> {
    let inside: BTreeSet<usize> = cells.iter().copied().collect();
    let mut ring: BTreeSet<(isize, isize)> = BTreeSet::new();
    for &i in cells {
        let (r, c) = ((i / cols) as isize, (i % cols) as isize);
        for dr in -1..=1 {
            for dc in -1..=1 {
                let (rr, cc) = (r + dr, c + dc);
                let in_grid = rr >= 0 && cc >= 0 && rr < rows as isize && cc < cols as isize;
                if in_grid && inside.contains(&(rr as usize * cols + cc as usize)) {
                    continue;
                }
                ring.insert((rr, cc));
            }
        }
    }
    ring.into_iter()
        .map(|(rr, cc)| {
            let in_grid = rr >= 0 && cc >= 0 && rr < rows as isize && cc < cols as isize;
            in_grid.then(|| rr as usize * cols + cc as usize)
        })
        .collect()
}

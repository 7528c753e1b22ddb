//! Depth grid: the immutable input of a QC run.
//!
//! A [`DepthGrid`] owns the depth samples, the no-data mask, the north-up
//! [`GeoTransform`] and the CRS descriptor, plus [`DatasetStats`] computed
//! once at construction. Non-finite samples are folded into the mask so that
//! downstream stages only have to consult one source of validity.
use crate::error::InputError;
use crate::raster::Raster;
use serde::Serialize;

/// North-up affine placement of the grid. Row 0 is the northern edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoTransform {
    /// World x of the western edge of column 0
    pub origin_x: f64,
    /// World y of the northern edge of row 0
    pub origin_y: f64,
    /// Cell size in projected units
    pub cell_size: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_size,
        }
    }

    /// World coordinates of a cell-corner lattice point `(row, col)`.
    #[inline]
    pub fn corner(&self, row: f64, col: f64) -> [f64; 2] {
        [
            self.origin_x + col * self.cell_size,
            self.origin_y - row * self.cell_size,
        ]
    }

    /// World coordinates of the centre of cell `(row, col)`.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> [f64; 2] {
        self.corner(row as f64 + 0.5, col as f64 + 0.5)
    }

    /// Fractional `(row, col)` position of a world point.
    #[inline]
    pub fn to_grid(&self, x: f64, y: f64) -> [f64; 2] {
        [
            (self.origin_y - y) / self.cell_size,
            (x - self.origin_x) / self.cell_size,
        ]
    }

    /// Cell containing a world point, if it lies inside a `rows × cols` grid.
    pub fn cell_at(&self, x: f64, y: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let [r, c] = self.to_grid(x, y);
        if r < 0.0 || c < 0.0 {
            return None;
        }
        let (r, c) = (r.floor() as usize, c.floor() as usize);
        (r < rows && c < cols).then_some((r, c))
    }
}

/// Whole-survey descriptive statistics over valid cells.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub valid_count: usize,
    pub nodata_count: usize,
    pub total_count: usize,
}

impl DatasetStats {
    fn compute(depths: &[f32], valid: &[bool]) -> Self {
        let mut values: Vec<f64> = depths
            .iter()
            .zip(valid)
            .filter_map(|(&d, &ok)| ok.then_some(d as f64))
            .collect();
        let total_count = depths.len();
        let valid_count = values.len();
        if values.is_empty() {
            return Self {
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                std: f64::NAN,
                median: f64::NAN,
                valid_count,
                nodata_count: total_count,
                total_count,
            };
        }
        let n = valid_count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        values.sort_by(|a, b| a.total_cmp(b));
        Self {
            min: values[0],
            max: values[valid_count - 1],
            mean,
            std: var.sqrt(),
            median: median_sorted(&values),
            valid_count,
            nodata_count: total_count - valid_count,
            total_count,
        }
    }
}

pub(crate) fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

#[derive(Clone, Debug)]
pub struct DepthGrid {
    depths: Raster,
    valid: Vec<bool>,
    transform: GeoTransform,
    crs: String,
    stats: DatasetStats,
}

impl DepthGrid {
    /// Build a grid from row-major depths and a no-data mask (`true` = no-data).
    pub fn new(
        rows: usize,
        cols: usize,
        depths: Vec<f32>,
        nodata: Vec<bool>,
        transform: GeoTransform,
        crs: impl Into<String>,
    ) -> Result<Self, InputError> {
        if rows == 0 || cols == 0 {
            return Err(InputError::Empty);
        }
        let expected = rows * cols;
        if depths.len() != expected {
            return Err(InputError::ShapeMismatch {
                what: "depth buffer",
                expected,
                actual: depths.len(),
            });
        }
        if nodata.len() != expected {
            return Err(InputError::ShapeMismatch {
                what: "no-data mask",
                expected,
                actual: nodata.len(),
            });
        }
        let cell = transform.cell_size;
        if !(cell.is_finite() && cell > 0.0) {
            return Err(InputError::InvalidResolution(cell));
        }

        let valid: Vec<bool> = depths
            .iter()
            .zip(&nodata)
            .map(|(d, &masked)| !masked && d.is_finite())
            .collect();
        if !valid.iter().any(|&v| v) {
            return Err(InputError::AllNoData);
        }
        let stats = DatasetStats::compute(&depths, &valid);
        let depths = Raster {
            rows,
            cols,
            data: depths,
        };
        Ok(Self {
            depths,
            valid,
            transform,
            crs: crs.into(),
            stats,
        })
    }

    /// Build a grid where cells equal to `nodata_value` are masked.
    pub fn from_sentinel(
        rows: usize,
        cols: usize,
        depths: Vec<f32>,
        nodata_value: f32,
        transform: GeoTransform,
        crs: impl Into<String>,
    ) -> Result<Self, InputError> {
        let mask = depths.iter().map(|&d| d == nodata_value).collect();
        Self::new(rows, cols, depths, mask, transform, crs)
    }

    /// Reject grids that cannot hold a single full feature window.
    pub fn check_window(&self, radius: usize) -> Result<(), InputError> {
        let min = 2 * radius + 1;
        if self.rows() < min || self.cols() < min {
            return Err(InputError::GridTooSmall {
                rows: self.rows(),
                cols: self.cols(),
                min,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.depths.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.depths.cols
    }

    #[inline]
    pub fn idx(&self, row: usize, col: usize) -> usize {
        self.depths.idx(row, col)
    }

    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[self.idx(row, col)]
    }

    /// Depth at `(row, col)`, `None` for no-data.
    #[inline]
    pub fn depth(&self, row: usize, col: usize) -> Option<f32> {
        let i = self.idx(row, col);
        self.valid[i].then(|| self.depths.data[i])
    }

    /// Raw depth buffer; masked cells keep whatever value was supplied.
    pub fn depths(&self) -> &Raster {
        &self.depths
    }

    pub fn valid_mask(&self) -> &[bool] {
        &self.valid
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn stats(&self) -> &DatasetStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> GeoTransform {
        GeoTransform::new(500_000.0, 6_000_000.0, 2.0)
    }

    #[test]
    fn rejects_mismatched_mask() {
        let err = DepthGrid::new(3, 3, vec![1.0; 9], vec![false; 8], transform(), "EPSG:32631")
            .unwrap_err();
        assert_eq!(
            err,
            InputError::ShapeMismatch {
                what: "no-data mask",
                expected: 9,
                actual: 8
            }
        );
    }

    #[test]
    fn rejects_all_nodata_and_bad_resolution() {
        let err = DepthGrid::new(2, 2, vec![1.0; 4], vec![true; 4], transform(), "").unwrap_err();
        assert_eq!(err, InputError::AllNoData);

        let nan = vec![f32::NAN; 4];
        let err = DepthGrid::new(2, 2, nan, vec![false; 4], transform(), "").unwrap_err();
        assert_eq!(err, InputError::AllNoData);

        let bad = GeoTransform::new(0.0, 0.0, 0.0);
        let err = DepthGrid::new(2, 2, vec![1.0; 4], vec![false; 4], bad, "").unwrap_err();
        assert_eq!(err, InputError::InvalidResolution(0.0));
    }

    #[test]
    fn window_check_reports_minimum() {
        let grid = DepthGrid::new(4, 9, vec![1.0; 36], vec![false; 36], transform(), "").unwrap();
        assert_eq!(
            grid.check_window(2),
            Err(InputError::GridTooSmall {
                rows: 4,
                cols: 9,
                min: 5
            })
        );
        assert!(grid.check_window(1).is_ok());
    }

    #[test]
    fn sentinel_cells_become_nodata_and_stats_skip_them() {
        let depths = vec![1.0, 2.0, -9999.0, 3.0, 4.0, 5.0];
        let grid = DepthGrid::from_sentinel(2, 3, depths, -9999.0, transform(), "").unwrap();
        assert_eq!(grid.depth(0, 2), None);
        assert_eq!(grid.depth(1, 0), Some(3.0));
        let stats = grid.stats();
        assert_eq!(stats.valid_count, 5);
        assert_eq!(stats.nodata_count, 1);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.median, 3.0);
        assert!((stats.mean - 3.0).abs() < 1e-12);
    }

    #[test]
    fn transform_maps_cells_north_up() {
        let t = transform();
        assert_eq!(t.cell_center(0, 0), [500_001.0, 5_999_999.0]);
        assert_eq!(t.cell_at(500_003.5, 5_999_996.5, 10, 10), Some((1, 1)));
        assert_eq!(t.cell_at(499_999.0, 5_999_999.0, 10, 10), None);
        let [r, c] = t.to_grid(500_001.0, 5_999_999.0);
        assert_eq!((r, c), (0.5, 0.5));
    }
}

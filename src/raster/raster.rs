//! Owned single-band f32 raster in row-major layout.
//!
//! No-data is encoded as `NaN` so that feature and score layers can be handed
//! to exporters without a side mask.
use super::traits::RasterView;

#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    /// Number of rows (north to south)
    pub rows: usize,
    /// Number of columns (west to east)
    pub cols: usize,
    /// Backing storage in row-major order
    pub data: Vec<f32>,
}

impl Raster {
    /// Construct a raster of `rows × cols` filled with `value`.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Construct a raster where every cell is no-data.
    pub fn nodata(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, f32::NAN)
    }

    /// Wrap an existing row-major buffer. Returns `None` on a size mismatch.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    #[inline]
    pub fn idx(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[self.idx(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, v: f32) {
        let i = self.idx(row, col);
        self.data[i] = v;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy of the buffer with every no-data cell replaced by `fill`.
    pub fn filled_nodata(&self, fill: f32) -> Vec<f32> {
        self.data
            .iter()
            .map(|&v| if v.is_finite() { v } else { fill })
            .collect()
    }

    /// Mean over the finite cells selected by `cells`, in f64.
    pub fn mean_over(&self, cells: &[usize]) -> Option<f64> {
        let mut sum = 0.0f64;
        let mut n = 0usize;
        for &i in cells {
            let v = self.data[i];
            if v.is_finite() {
                sum += v as f64;
                n += 1;
            }
        }
        (n > 0).then(|| sum / n as f64)
    }
}

impl RasterView for Raster {
    type Cell = f32;

    #[inline]
    fn rows(&self) -> usize {
        self.rows
    }
    #[inline]
    fn cols(&self) -> usize {
        self.cols
    }
    #[inline]
    fn row(&self, r: usize) -> &[f32] {
        let start = r * self.cols;
        &self.data[start..start + self.cols]
    }
}

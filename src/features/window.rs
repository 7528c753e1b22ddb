//! Windowed statistics that skip no-data cells.
use crate::raster::{Raster, RasterView};

/// Streaming mean/variance (Welford) with min/max tracking.
///
/// A window whose samples are all equal reports that value as its mean and a
/// standard deviation of exactly zero.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Moments {
    n: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Moments {
    pub(crate) fn new() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, v: f64) {
        self.n += 1;
        let d = v - self.mean;
        self.mean += d / self.n as f64;
        self.m2 += d * (v - self.mean);
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    pub(crate) fn len(&self) -> usize {
        self.n
    }

    fn is_constant(&self) -> bool {
        self.n > 0 && self.min == self.max
    }

    pub(crate) fn mean(&self) -> Option<f64> {
        match self.n {
            0 => None,
            _ if self.is_constant() => Some(self.min),
            _ => Some(self.mean),
        }
    }

    /// Population standard deviation.
    pub(crate) fn std(&self) -> Option<f64> {
        match self.n {
            0 => None,
            _ if self.is_constant() => Some(0.0),
            n => Some((self.m2 / n as f64).max(0.0).sqrt()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct WindowStats {
    /// Mean over the valid cells of the window, centre included
    pub mean: f64,
    /// Standard deviation over the same cells (roughness)
    pub std: f64,
    /// Mean of the valid cells excluding the centre
    pub neighbor_mean: f64,
    /// Standard deviation of the valid cells excluding the centre
    pub neighbor_std: f64,
    pub neighbor_count: usize,
}

/// Statistics of the `(2r+1)²` window centred on a valid cell.
///
/// When no neighbour is valid the neighbour statistics collapse onto the
/// centre sample (mean = centre, std = 0).
pub(crate) fn window_stats(
    depths: &Raster,
    valid: &[bool],
    row: usize,
    col: usize,
    radius: usize,
) -> WindowStats {
    let r0 = row.saturating_sub(radius);
    let r1 = (row + radius).min(depths.rows - 1);
    let c0 = col.saturating_sub(radius);
    let c1 = (col + radius).min(depths.cols - 1);
    let center = depths.get(row, col) as f64;

    let mut all = Moments::new();
    let mut nbr = Moments::new();
    for r in r0..=r1 {
        let line = depths.row(r);
        let base = r * depths.cols;
        for (c, &v) in line.iter().enumerate().take(c1 + 1).skip(c0) {
            if !valid[base + c] {
                continue;
            }
            let v = v as f64;
            all.push(v);
            if r != row || c != col {
                nbr.push(v);
            }
        }
    }

    WindowStats {
        mean: all.mean().unwrap_or(center),
        std: all.std().unwrap_or(0.0),
        neighbor_mean: nbr.mean().unwrap_or(center),
        neighbor_std: nbr.std().unwrap_or(0.0),
        neighbor_count: nbr.len(),
    }
}

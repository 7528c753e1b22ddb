//! Connected-component labelling of a binary cell mask.
use crate::config::Connectivity;
use nalgebra::{Matrix2, SymmetricEigen};

const NEIGH_OFFSETS_4: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const NEIGH_OFFSETS_8: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Moments of a growing region, enough for its centroid and principal axes.
#[derive(Clone, Debug)]
pub(crate) struct RegionAccumulator {
    pub indices: Vec<usize>,
    pub sum_r: f64,
    pub sum_c: f64,
    pub sum_rr: f64,
    pub sum_cc: f64,
    pub sum_rc: f64,
}

impl RegionAccumulator {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: Vec::with_capacity(capacity),
            sum_r: 0.0,
            sum_c: 0.0,
            sum_rr: 0.0,
            sum_cc: 0.0,
            sum_rc: 0.0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.indices.clear();
        self.sum_r = 0.0;
        self.sum_c = 0.0;
        self.sum_rr = 0.0;
        self.sum_cc = 0.0;
        self.sum_rc = 0.0;
    }

    pub(crate) fn push(&mut self, idx: usize, row: usize, col: usize) {
        self.indices.push(idx);
        let (r, c) = (row as f64, col as f64);
        self.sum_r += r;
        self.sum_c += c;
        self.sum_rr += r * r;
        self.sum_cc += c * c;
        self.sum_rc += r * c;
    }

    pub(crate) fn len(&self) -> usize {
        self.indices.len()
    }

    /// Ratio of the principal standard deviations (>= 1). A single cell or a
    /// square block gives 1; a one-cell-wide line grows with its length.
    pub(crate) fn elongation(&self) -> f64 {
        let n = self.len() as f64;
        if n < 2.0 {
            return 1.0;
        }
        let mr = self.sum_r / n;
        let mc = self.sum_c / n;
        // cells are unit squares: add their own 1/12 variance per axis
        let crr = self.sum_rr / n - mr * mr + 1.0 / 12.0;
        let ccc = self.sum_cc / n - mc * mc + 1.0 / 12.0;
        let crc = self.sum_rc / n - mr * mc;
        let eig = SymmetricEigen::new(Matrix2::new(ccc, crc, crc, crr));
        let (a, b) = (eig.eigenvalues[0], eig.eigenvalues[1]);
        let (major, minor) = if a >= b { (a, b) } else { (b, a) };
        (major.max(0.0) / minor.max(1e-12)).sqrt()
    }
}

/// One labelled component; `cells` are raster indices in ascending order.
#[derive(Clone, Debug)]
pub struct Component {
    pub label: usize,
    pub cells: Vec<usize>,
    pub elongation: f64,
}

/// Label the `true` cells of `mask`. Components are numbered in raster order
/// of their first cell, which keeps the output deterministic.
pub fn label_components(
    mask: &[bool],
    rows: usize,
    cols: usize,
    connectivity: Connectivity,
) -> Vec<Component> {
    let offsets: &[(isize, isize)] = match connectivity {
        Connectivity::Four => &NEIGH_OFFSETS_4,
        Connectivity::Eight => &NEIGH_OFFSETS_8,
    };
    let mut used = vec![false; rows * cols];
    let mut stack: Vec<usize> = Vec::with_capacity(64);
    let mut region = RegionAccumulator::with_capacity(128);
    let mut components = Vec::new();

    for seed in 0..rows * cols {
        if !mask[seed] || used[seed] {
            continue;
        }
        region.reset();
        used[seed] = true;
        stack.push(seed);
        while let Some(idx) = stack.pop() {
            let (r, c) = (idx / cols, idx % cols);
            region.push(idx, r, c);
            for &(dr, dc) in offsets {
                let rr = r as isize + dr;
                let cc = c as isize + dc;
                if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
                    continue;
                }
                let j = rr as usize * cols + cc as usize;
                if mask[j] && !used[j] {
                    used[j] = true;
                    stack.push(j);
                }
            }
        }
        let mut cells = region.indices.clone();
        cells.sort_unstable();
        components.push(Component {
            label: components.len(),
            cells,
            elongation: region.elongation(),
        });
    }
    components
}

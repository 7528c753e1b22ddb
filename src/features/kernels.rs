//! 3×3 derivative kernels over a depth raster with a validity mask.
//!
//! - Sobel X/Y give the horizontal derivatives; slope is their Euclidean
//!   norm scaled to depth units per ground unit.
//! - Curvature applies Sobel a second time to each derivative field and
//!   averages the absolute responses.
//! - The Laplacian is the 4-neighbour discrete kernel.
//!
//! A no-data neighbour contributes the centre sample instead of zero, and rows
//! or columns beyond the border are clamped. Masked centres produce 0; callers
//! mask those cells out afterwards.
use crate::raster::Raster;
use rayon::prelude::*;

type Kernel3 = [[f32; 3]; 3];

const SOBEL_KERNEL_X: Kernel3 = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_KERNEL_Y: Kernel3 = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];
const LAPLACE_KERNEL_4: Kernel3 = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];

/// Sum of absolute Sobel weights along one axis.
const SOBEL_NORM: f64 = 8.0;

#[derive(Clone, Debug)]
pub(crate) struct Derivatives {
    pub slope: Raster,
    pub curvature: Raster,
    pub laplacian: Raster,
}

impl Derivatives {
    pub(crate) fn compute(depths: &Raster, valid: &[bool], cell_size: f64) -> Self {
        let gx = correlate3(depths, valid, &SOBEL_KERNEL_X);
        let gy = correlate3(depths, valid, &SOBEL_KERNEL_Y);
        let gxx = correlate3(&gx, valid, &SOBEL_KERNEL_X);
        let gyy = correlate3(&gy, valid, &SOBEL_KERNEL_Y);
        let laplacian = correlate3(depths, valid, &LAPLACE_KERNEL_4);

        let scale = (1.0 / (SOBEL_NORM * cell_size)) as f32;
        let slope_data = gx
            .data
            .iter()
            .zip(&gy.data)
            .map(|(&x, &y)| (x * x + y * y).sqrt() * scale)
            .collect();
        let curvature_data = gxx
            .data
            .iter()
            .zip(&gyy.data)
            .map(|(&xx, &yy)| 0.5 * (xx.abs() + yy.abs()))
            .collect();

        Self {
            slope: Raster {
                rows: depths.rows,
                cols: depths.cols,
                data: slope_data,
            },
            curvature: Raster {
                rows: depths.rows,
                cols: depths.cols,
                data: curvature_data,
            },
            laplacian,
        }
    }
}

fn correlate3(src: &Raster, valid: &[bool], kernel: &Kernel3) -> Raster {
    let (rows, cols) = (src.rows, src.cols);
    let mut out = Raster::filled(rows, cols, 0.0);
    if rows == 0 || cols == 0 {
        return out;
    }

    out.data
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(r, out_row)| {
            let r_idx = [r.saturating_sub(1), r, (r + 1).min(rows - 1)];
            for (c, out_px) in out_row.iter_mut().enumerate() {
                let center_i = r * cols + c;
                if !valid[center_i] {
                    continue;
                }
                let center = src.data[center_i];
                let c_idx = [c.saturating_sub(1), c, (c + 1).min(cols - 1)];
                let mut sum = 0.0f32;
                for (ky, &rr) in r_idx.iter().enumerate() {
                    for (kx, &cc) in c_idx.iter().enumerate() {
                        let weight = kernel[ky][kx];
                        if weight == 0.0 {
                            continue;
                        }
                        let j = rr * cols + cc;
                        let v = if valid[j] { src.data[j] } else { center };
                        sum += v * weight;
                    }
                }
                *out_px = sum;
            }
        });
    out
}

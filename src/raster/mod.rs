//! Raster buffers shared by every stage of a QC run.
//!
//! - [`Raster`]: owned single-band `f32` grid in row-major order.
//! - [`RasterView`]: read-only row access used by kernels and exporters.
//! - [`io`]: heatmap PNG export and JSON helpers.
pub mod io;
mod raster;
mod traits;

pub use self::raster::Raster;
pub use self::traits::{RasterView, Rows};

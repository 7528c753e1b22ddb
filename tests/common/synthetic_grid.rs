use bathy_qc::{DepthGrid, GeoTransform};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Flat survey of `depth` with optional single-cell spikes and no-data blocks.
pub struct SurveyBuilder {
    rows: usize,
    cols: usize,
    depths: Vec<f32>,
    nodata: Vec<bool>,
}

impl SurveyBuilder {
    pub fn flat(rows: usize, cols: usize, depth: f32) -> Self {
        assert!(rows > 0 && cols > 0, "grid dimensions must be positive");
        Self {
            rows,
            cols,
            depths: vec![depth; rows * cols],
            nodata: vec![false; rows * cols],
        }
    }

    pub fn spike(mut self, row: usize, col: usize, depth: f32) -> Self {
        self.depths[row * self.cols + col] = depth;
        self
    }

    pub fn hole(mut self, row: usize, col: usize, height: usize, width: usize) -> Self {
        for r in row..row + height {
            for c in col..col + width {
                self.nodata[r * self.cols + c] = true;
            }
        }
        self
    }

    pub fn build(self) -> DepthGrid {
        DepthGrid::new(
            self.rows,
            self.cols,
            self.depths,
            self.nodata,
            GeoTransform::new(500_000.0, 6_000_000.0, 1.0),
            "EPSG:32631",
        )
        .expect("synthetic survey is a valid grid")
    }
}

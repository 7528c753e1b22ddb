use super::{load_run_config, RunConfig};
use crate::error::InputError;
use crate::grid::{DepthGrid, GeoTransform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Tool config for `qc_demo`.
#[derive(Debug, Deserialize)]
pub struct QcDemoConfig {
    pub input: SurveyInput,
    /// Overrides on top of the default run config.
    #[serde(default)]
    pub run: RunConfig,
    /// Separate run config file; takes precedence over `run`.
    #[serde(default)]
    pub run_config: Option<PathBuf>,
    pub output: QcDemoOutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyInput {
    /// Path to a [`GridFile`] JSON document.
    GridFile(PathBuf),
    Synthetic(SyntheticSurvey),
}

#[derive(Debug, Deserialize)]
pub struct QcDemoOutputConfig {
    pub report_json: PathBuf,
    pub heatmap_png: Option<PathBuf>,
}

/// Depth grid serialised as JSON, row-major, north-up.
#[derive(Debug, Deserialize)]
pub struct GridFile {
    pub rows: usize,
    pub cols: usize,
    pub depths: Vec<f32>,
    #[serde(default)]
    pub nodata_value: Option<f32>,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
    pub cell_size: f64,
    #[serde(default)]
    pub crs: String,
}

impl GridFile {
    pub fn into_grid(self) -> Result<DepthGrid, InputError> {
        let transform = GeoTransform::new(self.origin_x, self.origin_y, self.cell_size);
        let nodata_value = self.nodata_value.unwrap_or(f32::NAN);
        DepthGrid::from_sentinel(
            self.rows,
            self.cols,
            self.depths,
            nodata_value,
            transform,
            self.crs,
        )
    }
}

/// Gently sloping seabed with optional noise, spikes and no-data holes.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyntheticSurvey {
    pub rows: usize,
    pub cols: usize,
    pub cell_size: f64,
    pub base_depth: f32,
    /// Depth gained per column.
    pub slope: f32,
    /// Half-width of the uniform noise added to every cell.
    pub noise: f32,
    pub seed: u64,
    /// `[row, col]` of single-cell spikes.
    pub spikes: Vec<[usize; 2]>,
    pub spike_height: f32,
    /// `[row, col, height, width]` blocks of no-data.
    pub holes: Vec<[usize; 4]>,
}

impl Default for SyntheticSurvey {
    fn default() -> Self {
        Self {
            rows: 64,
            cols: 64,
            cell_size: 1.0,
            base_depth: 25.0,
            slope: 0.05,
            noise: 0.05,
            seed: 7,
            spikes: vec![[20, 40]],
            spike_height: 15.0,
            holes: vec![[40, 12, 4, 4]],
        }
    }
}

impl SyntheticSurvey {
    pub fn build(&self) -> Result<DepthGrid, InputError> {
        let (rows, cols) = (self.rows, self.cols);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut depths: Vec<f32> = (0..rows * cols)
            .map(|i| {
                let c = (i % cols) as f32;
                let jitter = if self.noise > 0.0 {
                    rng.gen_range(-self.noise..=self.noise)
                } else {
                    0.0
                };
                self.base_depth + self.slope * c + jitter
            })
            .collect();
        for &[r, c] in &self.spikes {
            if r < rows && c < cols {
                depths[r * cols + c] += self.spike_height;
            }
        }
        let mut nodata = vec![false; rows * cols];
        for &[r0, c0, h, w] in &self.holes {
            for r in r0..(r0 + h).min(rows) {
                for c in c0..(c0 + w).min(cols) {
                    nodata[r * cols + c] = true;
                }
            }
        }
        let origin_y = rows as f64 * self.cell_size;
        DepthGrid::new(
            rows,
            cols,
            depths,
            nodata,
            GeoTransform::new(0.0, origin_y, self.cell_size),
            "LOCAL",
        )
    }
}

impl QcDemoConfig {
    /// The run config in force: the referenced file if any, else the inline one.
    pub fn resolve_run(&self) -> Result<RunConfig, String> {
        match &self.run_config {
            Some(path) => load_run_config(path),
            None => Ok(self.run.clone()),
        }
    }
}

impl SurveyInput {
    pub fn load(&self) -> Result<DepthGrid, String> {
        match self {
            SurveyInput::GridFile(path) => {
                let file: GridFile = crate::raster::io::read_json_file(path)?;
                file.into_grid()
                    .map_err(|e| format!("Invalid grid {}: {e}", path.display()))
            }
            SurveyInput::Synthetic(survey) => survey
                .build()
                .map_err(|e| format!("Invalid synthetic survey: {e}")),
        }
    }
}

pub fn load_config(path: &Path) -> Result<QcDemoConfig, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

//! I/O helpers for score rasters and JSON.
//!
//! - `save_heatmap_png`: write a `[0, 1]` raster to a grayscale PNG preview.
//! - `write_json_file` / `read_json_file`: serde JSON to and from disk.
use super::{Raster, RasterView};
use image::{GrayImage, Luma};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Fill value used when score grids leave the crate with no-data cells.
pub const EXPORT_NODATA: f32 = -9999.0;

/// Save a score raster as a grayscale PNG. No-data cells are written black.
pub fn save_heatmap_png(raster: &Raster, path: &Path) -> Result<(), String> {
    ensure_parent_dir(path)?;
    let mut out = GrayImage::new(raster.cols as u32, raster.rows as u32);
    for (r, row) in raster.row_iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            let px = if v.is_finite() {
                (v * 255.0).clamp(0.0, 255.0) as u8
            } else {
                0
            };
            out.put_pixel(c as u32, r as u32, Luma([px]));
        }
    }
    out.save(path)
        .map_err(|e| format!("Failed to save {}: {e}", path.display()))
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize JSON for {}: {e}", path.display()))?;
    fs::write(path, json).map_err(|e| format!("Failed to write JSON {}: {e}", path.display()))
}

/// Read and deserialize a JSON document.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&data).map_err(|e| format!("Failed to parse {}: {e}", path.display()))
}

fn ensure_parent_dir(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
    }
    Ok(())
}

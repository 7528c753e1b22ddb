//! Robust univariate detector: modified z-score of the depth residual.
//!
//! The residual of a cell is its depth minus the mean of its valid window
//! neighbours, so a sloping seafloor does not light up by itself. The
//! modified z-score uses the median and the median absolute deviation (MAD)
//! of the residuals, which the outliers being hunted barely move.
use crate::grid::median_sorted;

const MAD_SCALE: f64 = 0.6745;
/// Consistency constant for the mean absolute deviation fallback.
const MEAN_AD_SCALE: f64 = 1.253_314;
const SPREAD_EPS: f64 = 1e-9;

/// Scores in `[0, 1]`: `min(|modified z| / mad_threshold, 1)`.
///
/// When more than half the residuals coincide the MAD is zero; the mean
/// absolute deviation takes over. When that vanishes too, a residual scores
/// 1 if it differs from the median at all, otherwise 0.
pub fn robust_scores(residuals: &[f64], mad_threshold: f64) -> Vec<f64> {
    if residuals.is_empty() {
        return Vec::new();
    }
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = median_sorted(&sorted);

    let mut abs_dev: Vec<f64> = residuals.iter().map(|r| (r - median).abs()).collect();
    let mean_ad = abs_dev.iter().sum::<f64>() / abs_dev.len() as f64;
    abs_dev.sort_by(|a, b| a.total_cmp(b));
    let mad = median_sorted(&abs_dev);

    residuals
        .iter()
        .map(|&r| {
            let dev = r - median;
            let modified_z = if mad > SPREAD_EPS {
                MAD_SCALE * dev / mad
            } else if mean_ad > SPREAD_EPS {
                dev / (MEAN_AD_SCALE * mean_ad)
            } else if dev.abs() > SPREAD_EPS {
                f64::INFINITY
            } else {
                0.0
            };
            (modified_z.abs() / mad_threshold).min(1.0)
        })
        .collect()
}

//! Run configuration: every threshold, weight and size limit that shapes the
//! result of a QC run.
//!
//! A [`RunConfig`] is plain data that can be loaded from JSON with partial
//! overrides. The pipeline only accepts a [`FrozenConfig`], produced by
//! [`RunConfig::frozen`], which has been validated and carries the
//! `config_hash` stored with every run.
use crate::error::QcError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Version stamped on runs and review entries.
pub const MODEL_VERSION: &str = env!("CARGO_PKG_VERSION");

const WEIGHT_SUM_TOL: f64 = 1e-6;
const CONFIG_HASH_LEN: usize = 16;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub features: FeatureOptions,
    pub forest: ForestOptions,
    pub robust: RobustOptions,
    pub fusion: FusionWeights,
    pub confidence: ConfidenceBreakpoints,
    pub priority: PriorityWeights,
    pub polygon: PolygonOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOptions {
    /// Half-size of the square window; radius 2 gives a 5×5 window.
    pub window_radius: usize,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self { window_radius: 2 }
    }
}

impl FeatureOptions {
    pub fn window_size(&self) -> usize {
        2 * self.window_radius + 1
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestOptions {
    pub n_trees: usize,
    /// Cells drawn (without replacement) to grow each tree.
    pub max_samples: usize,
    pub seed: u64,
    /// Below this many valid feature cells the forest refuses to fit.
    pub min_fit_cells: usize,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            seed: 42,
            min_fit_cells: 32,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustOptions {
    /// Modified z-score mapped to a robust score of 1.0.
    pub mad_threshold: f64,
}

impl Default for RobustOptions {
    fn default() -> Self {
        Self { mad_threshold: 3.5 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub isolation: f64,
    pub robust: f64,
    pub spatial: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            isolation: 0.5,
            robust: 0.3,
            spatial: 0.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceBreakpoints {
    pub high: f64,
    pub medium: f64,
}

impl Default for ConfidenceBreakpoints {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub score: f64,
    pub depth_variance: f64,
    pub area: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            score: 0.5,
            depth_variance: 0.3,
            area: 0.2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolygonOptions {
    /// Cells with a fused score strictly above this value are anomalous.
    pub detection_threshold: f64,
    /// Components with fewer cells are discarded as noise.
    pub min_pixels: usize,
    pub connectivity: Connectivity,
    /// Douglas–Peucker tolerance in cell units.
    pub simplify_tolerance: f64,
    /// Peak |z| that makes a compact region a spike.
    pub spike_z: f64,
    /// Principal-axis ratio at which a region counts as elongated.
    pub elongation_ratio: f64,
    /// Fraction of the ring around a no-data cluster that must be valid survey.
    pub gap_min_enclosure: f64,
}

impl Default for PolygonOptions {
    fn default() -> Self {
        Self {
            detection_threshold: 0.6,
            min_pixels: 9,
            connectivity: Connectivity::Eight,
            simplify_tolerance: 0.5,
            spike_z: 3.0,
            elongation_ratio: 3.0,
            gap_min_enclosure: 0.75,
        }
    }
}

/// Validated, hashed configuration for one run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrozenConfig {
    config: RunConfig,
    config_hash: String,
}

impl FrozenConfig {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }
}

impl RunConfig {
    /// Validate and hash, producing the only form the pipeline accepts.
    pub fn frozen(self) -> Result<FrozenConfig, QcError> {
        self.validate()?;
        let config_hash = self.config_hash()?;
        Ok(FrozenConfig {
            config: self,
            config_hash,
        })
    }

    /// SHA-256 of the canonical JSON form, first 16 hex characters.
    pub fn config_hash(&self) -> Result<String, QcError> {
        let canonical = serde_json::to_vec(self)
            .map_err(|e| QcError::Config(format!("cannot serialize config: {e}")))?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        let mut hash = hex::encode(hasher.finalize());
        hash.truncate(CONFIG_HASH_LEN);
        Ok(hash)
    }

    pub fn validate(&self) -> Result<(), QcError> {
        if self.features.window_radius < 1 {
            return Err(invalid("features.window_radius must be >= 1"));
        }

        let f = &self.forest;
        if f.n_trees == 0 {
            return Err(invalid("forest.n_trees must be >= 1"));
        }
        if f.max_samples < 2 {
            return Err(invalid("forest.max_samples must be >= 2"));
        }
        if f.min_fit_cells < 2 {
            return Err(invalid("forest.min_fit_cells must be >= 2"));
        }

        let mad = self.robust.mad_threshold;
        if !(mad.is_finite() && mad > 0.0) {
            return Err(invalid("robust.mad_threshold must be finite and positive"));
        }

        let w = &self.fusion;
        check_weights(
            "fusion",
            &[
                ("isolation", w.isolation),
                ("robust", w.robust),
                ("spatial", w.spatial),
            ],
        )?;
        let p = &self.priority;
        check_weights(
            "priority",
            &[
                ("score", p.score),
                ("depth_variance", p.depth_variance),
                ("area", p.area),
            ],
        )?;

        let c = &self.confidence;
        check_unit("confidence.high", c.high)?;
        check_unit("confidence.medium", c.medium)?;
        if c.medium > c.high {
            return Err(invalid("confidence.medium must not exceed confidence.high"));
        }

        let poly = &self.polygon;
        check_unit("polygon.detection_threshold", poly.detection_threshold)?;
        check_unit("polygon.gap_min_enclosure", poly.gap_min_enclosure)?;
        if poly.min_pixels < 1 {
            return Err(invalid("polygon.min_pixels must be >= 1"));
        }
        if !(poly.simplify_tolerance.is_finite() && poly.simplify_tolerance >= 0.0) {
            return Err(invalid("polygon.simplify_tolerance must be finite and >= 0"));
        }
        if !(poly.spike_z.is_finite() && poly.spike_z > 0.0) {
            return Err(invalid("polygon.spike_z must be finite and positive"));
        }
        if !(poly.elongation_ratio.is_finite() && poly.elongation_ratio >= 1.0) {
            return Err(invalid("polygon.elongation_ratio must be >= 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> QcError {
    QcError::Config(msg.into())
}

fn check_unit(name: &str, v: f64) -> Result<(), QcError> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must lie in [0, 1], got {v}")))
    }
}

fn check_weights(group: &str, weights: &[(&str, f64)]) -> Result<(), QcError> {
    for (name, w) in weights {
        check_unit(&format!("{group}.{name}"), *w)?;
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOL {
        return Err(invalid(format!("{group} weights must sum to 1, got {sum}")));
    }
    Ok(())
}

/// Load a run config from JSON; missing fields take their defaults.
pub fn load_run_config(path: &Path) -> Result<RunConfig, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let frozen = RunConfig::default().frozen().expect("defaults validate");
        assert_eq!(frozen.config_hash().len(), 16);
        assert!(frozen.config_hash().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_tracks_content() {
        let a = RunConfig::default().config_hash().unwrap();
        let b = RunConfig::default().config_hash().unwrap();
        assert_eq!(a, b);

        let mut changed = RunConfig::default();
        changed.polygon.detection_threshold = 0.7;
        assert_ne!(a, changed.config_hash().unwrap());
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let mut cfg = RunConfig::default();
        cfg.fusion.spatial = 0.3;
        let err = cfg.frozen().unwrap_err();
        assert!(
            matches!(&err, QcError::Config(msg) if msg.contains("fusion")),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = RunConfig::default();
        cfg.features.window_radius = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.polygon.detection_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.confidence.medium = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: RunConfig =
            serde_json::from_str(r#"{ "polygon": { "min_pixels": 4 } }"#).unwrap();
        assert_eq!(cfg.polygon.min_pixels, 4);
        assert_eq!(cfg.polygon.detection_threshold, 0.6);
        assert_eq!(cfg.forest, ForestOptions::default());
    }
}

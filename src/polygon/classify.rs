//! Region signatures, type labels and explanations.
//!
//! The type label is explanatory only: a compact region with an extreme
//! local z-score is a spike, elongated regions are seams when slope dominates
//! and noise bands when roughness does, compact slope-dominated regions are
//! discontinuities. Everything else is `unknown`.
use crate::anomaly::{AnomalyType, Explanation};
use crate::config::RunConfig;
use crate::detect::DetectorKind;
use std::collections::{BTreeMap, BTreeSet};

const LIFT_EPS: f64 = 1e-9;

/// Summary of one scored region, shared by the classifier and the explanation.
#[derive(Clone, Debug)]
pub(crate) struct RegionSignature {
    pub feature_means: BTreeMap<String, f64>,
    pub peak_abs_z: f64,
    pub elongation: f64,
    /// Region mean slope over the survey mean slope
    pub slope_lift: f64,
    /// Region mean roughness over the survey mean roughness
    pub roughness_lift: f64,
    pub detector_means: Vec<(DetectorKind, f64)>,
}

pub(crate) fn lift(region_mean: f64, population_mean: f64) -> f64 {
    region_mean / population_mean.max(LIFT_EPS)
}

pub(crate) fn classify(sig: &RegionSignature, config: &RunConfig) -> AnomalyType {
    let opts = &config.polygon;
    let elongated = sig.elongation >= opts.elongation_ratio;
    if !elongated && sig.peak_abs_z >= opts.spike_z {
        return AnomalyType::Spike;
    }
    let slope_dominant = sig.slope_lift > sig.roughness_lift;
    match (elongated, slope_dominant) {
        (true, true) => AnomalyType::Seam,
        (true, false) if sig.roughness_lift > 1.0 => AnomalyType::NoiseBand,
        (false, true) => AnomalyType::Discontinuity,
        _ => AnomalyType::Unknown,
    }
}

fn reason(kind: DetectorKind) -> &'static str {
    match kind {
        DetectorKind::IsolationForest => "Unusual feature combination detected by isolation forest",
        DetectorKind::RobustZScore => "Depth significantly different from neighbours",
        DetectorKind::SpatialConsistency => "Inconsistent with surrounding surface",
        DetectorKind::CoverageGap => "No-data gap enclosed by valid survey coverage",
    }
}

pub(crate) fn thresholds(config: &RunConfig) -> BTreeMap<String, f64> {
    let poly = &config.polygon;
    [
        ("detection_threshold", poly.detection_threshold),
        ("mad_threshold", config.robust.mad_threshold),
        ("confidence_high", config.confidence.high),
        ("confidence_medium", config.confidence.medium),
        ("min_pixels", poly.min_pixels as f64),
        ("spike_z", poly.spike_z),
        ("elongation_ratio", poly.elongation_ratio),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Explanation for a scored region. The detector set is never empty: when no
/// detector mean clears the threshold the strongest one is listed.
pub(crate) fn explain(sig: &RegionSignature, config: &RunConfig) -> Explanation {
    let threshold = config.polygon.detection_threshold;
    let strongest = sig
        .detector_means
        .iter()
        .copied()
        .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(kind, _)| kind)
        .unwrap_or(DetectorKind::IsolationForest);

    let mut detectors: BTreeSet<DetectorKind> = sig
        .detector_means
        .iter()
        .filter(|(_, mean)| *mean > threshold)
        .map(|(kind, _)| *kind)
        .collect();
    if detectors.is_empty() {
        detectors.insert(strongest);
    }

    let mut feature_means = sig.feature_means.clone();
    feature_means.insert("peak_abs_z".to_string(), sig.peak_abs_z);
    feature_means.insert("elongation".to_string(), sig.elongation);

    Explanation {
        primary_reason: reason(strongest).to_string(),
        feature_means,
        thresholds: thresholds(config),
        detectors,
    }
}

/// Explanation for an enclosed no-data cluster.
pub(crate) fn explain_gap(
    enclosure: f64,
    cells: usize,
    ring_mean: f64,
    ring_std: f64,
    config: &RunConfig,
) -> Explanation {
    let feature_means = [
        ("coverage_enclosure", enclosure),
        ("gap_cells", cells as f64),
        ("ring_depth_mean", ring_mean),
        ("ring_depth_std", ring_std),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let thresholds = [
        ("gap_min_enclosure", config.polygon.gap_min_enclosure),
        ("min_pixels", config.polygon.min_pixels as f64),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    Explanation {
        primary_reason: reason(DetectorKind::CoverageGap).to_string(),
        feature_means,
        thresholds,
        detectors: BTreeSet::from([DetectorKind::CoverageGap]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(elongation: f64, peak_abs_z: f64, slope_lift: f64, roughness_lift: f64) -> RegionSignature {
        RegionSignature {
            feature_means: BTreeMap::new(),
            peak_abs_z,
            elongation,
            slope_lift,
            roughness_lift,
            detector_means: vec![
                (DetectorKind::IsolationForest, 0.7),
                (DetectorKind::RobustZScore, 0.9),
                (DetectorKind::SpatialConsistency, 0.4),
            ],
        }
    }

    #[test]
    fn labels_follow_shape_and_dominant_feature() {
        let cfg = RunConfig::default();
        assert_eq!(classify(&signature(1.0, 4.9, 1.0, 5.0), &cfg), AnomalyType::Spike);
        assert_eq!(classify(&signature(6.0, 4.9, 8.0, 2.0), &cfg), AnomalyType::Seam);
        assert_eq!(classify(&signature(6.0, 1.0, 2.0, 8.0), &cfg), AnomalyType::NoiseBand);
        assert_eq!(classify(&signature(1.5, 1.0, 8.0, 2.0), &cfg), AnomalyType::Discontinuity);
        assert_eq!(classify(&signature(1.5, 1.0, 1.0, 2.0), &cfg), AnomalyType::Unknown);
    }

    #[test]
    fn explanation_lists_detectors_above_threshold() {
        let cfg = RunConfig::default();
        let e = explain(&signature(1.0, 4.9, 1.0, 1.0), &cfg);
        assert_eq!(e.primary_reason, "Depth significantly different from neighbours");
        assert_eq!(
            e.detectors,
            BTreeSet::from([DetectorKind::IsolationForest, DetectorKind::RobustZScore])
        );
        assert_eq!(e.thresholds["detection_threshold"], 0.6);
        assert_eq!(e.feature_means["peak_abs_z"], 4.9);
        assert!(!e.is_empty());
    }

    #[test]
    fn weak_region_still_names_its_strongest_detector() {
        let cfg = RunConfig::default();
        let mut sig = signature(1.0, 0.0, 0.0, 0.0);
        sig.detector_means = vec![
            (DetectorKind::IsolationForest, 0.3),
            (DetectorKind::RobustZScore, 0.2),
            (DetectorKind::SpatialConsistency, 0.55),
        ];
        let e = explain(&sig, &cfg);
        assert_eq!(e.detectors, BTreeSet::from([DetectorKind::SpatialConsistency]));
        assert_eq!(e.primary_reason, "Inconsistent with surrounding surface");
    }
}

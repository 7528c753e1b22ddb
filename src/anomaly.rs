//! Anomaly records handed to reviewers and exporters.
use crate::detect::DetectorKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Best-effort label derived from the region's feature signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    Hole,
    Seam,
    NoiseBand,
    Discontinuity,
    Unknown,
}

impl AnomalyType {
    pub fn name(self) -> &'static str {
        match self {
            AnomalyType::Spike => "spike",
            AnomalyType::Hole => "hole",
            AnomalyType::Seam => "seam",
            AnomalyType::NoiseBand => "noise_band",
            AnomalyType::Discontinuity => "discontinuity",
            AnomalyType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Pending,
    Accepted,
    Rejected,
}

impl ReviewDecision {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReviewDecision::Pending)
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReviewDecision::Pending => "pending",
            ReviewDecision::Accepted => "accepted",
            ReviewDecision::Rejected => "rejected",
        })
    }
}

/// Simplified outer ring in world coordinates, counter-clockwise, first
/// vertex not repeated.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Polygon {
    pub exterior: Vec<[f64; 2]>,
}

impl Polygon {
    pub fn area(&self) -> f64 {
        crate::polygon::simplify::ring_area(&self.exterior).abs()
    }

    /// Even-odd point-in-polygon test.
    pub fn contains(&self, p: [f64; 2]) -> bool {
        let ring = &self.exterior;
        let n = ring.len();
        let mut inside = false;
        let mut j = n.wrapping_sub(1);
        for i in 0..n {
            let (a, b) = (ring[i], ring[j]);
            if (a[1] > p[1]) != (b[1] > p[1]) {
                let x = (b[0] - a[0]) * (p[1] - a[1]) / (b[1] - a[1]) + a[0];
                if p[0] < x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Why a region was reported, built from the same values used to detect it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub primary_reason: String,
    /// Feature name → mean over the region.
    pub feature_means: BTreeMap<String, f64>,
    /// Threshold name → value in force for the run.
    pub thresholds: BTreeMap<String, f64>,
    /// Detectors whose region mean exceeded the detection threshold.
    pub detectors: BTreeSet<DetectorKind>,
}

impl Explanation {
    pub fn is_empty(&self) -> bool {
        self.primary_reason.is_empty() || self.detectors.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: Uuid,
    pub run_id: Uuid,
    /// Creation order within the run; breaks priority ties.
    pub sequence: u64,
    pub polygon: Polygon,
    pub centroid: [f64; 2],
    pub pixel_count: usize,
    /// Area in squared projected units.
    pub area: f64,
    pub anomaly_type: AnomalyType,
    pub probability: f64,
    pub confidence: ConfidenceTier,
    pub qc_priority: f64,
    pub explanation: Explanation,
    pub local_depth_mean: f64,
    pub local_depth_std: f64,
    pub decision: ReviewDecision,
    pub created_at: DateTime<Utc>,
}

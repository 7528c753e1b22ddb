//! Confidence tiers, QC priority and review ordering.
//!
//! Priority mixes the region probability with two factors normalised against
//! the largest value in the same run, so priorities compare within a run
//! but not across runs:
//!
//! `priority = w_score·p + w_var·(depth_std / max depth_std) + w_area·(pixels / max pixels)`
use crate::anomaly::{Anomaly, ConfidenceTier};
use crate::config::{ConfidenceBreakpoints, PriorityWeights};

/// Tier for a probability; monotonic in `p`.
pub fn confidence_tier(p: f64, breakpoints: &ConfidenceBreakpoints) -> ConfidenceTier {
    if p >= breakpoints.high {
        ConfidenceTier::High
    } else if p >= breakpoints.medium {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// Input of the priority formula for one region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorityInput {
    pub probability: f64,
    pub depth_std: f64,
    pub pixel_count: usize,
}

fn normalised(v: f64, max: f64) -> f64 {
    if max > 0.0 && v.is_finite() {
        (v / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// QC priority for every input, normalised against the run's extremes.
pub fn qc_priorities(inputs: &[PriorityInput], weights: &PriorityWeights) -> Vec<f64> {
    let max_std = inputs
        .iter()
        .map(|i| i.depth_std)
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);
    let max_pixels = inputs.iter().map(|i| i.pixel_count).max().unwrap_or(0) as f64;
    inputs
        .iter()
        .map(|i| {
            weights.score * i.probability.clamp(0.0, 1.0)
                + weights.depth_variance * normalised(i.depth_std, max_std)
                + weights.area * normalised(i.pixel_count as f64, max_pixels)
        })
        .collect()
}

/// Sort for review: priority descending, ties by creation order.
pub fn rank_by_priority(anomalies: &mut [Anomaly]) {
    anomalies.sort_by(|a, b| {
        b.qc_priority
            .total_cmp(&a.qc_priority)
            .then(a.sequence.cmp(&b.sequence))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_use_inclusive_lower_bounds() {
        let bp = ConfidenceBreakpoints::default();
        assert_eq!(confidence_tier(0.8, &bp), ConfidenceTier::High);
        assert_eq!(confidence_tier(0.7999, &bp), ConfidenceTier::Medium);
        assert_eq!(confidence_tier(0.5, &bp), ConfidenceTier::Medium);
        assert_eq!(confidence_tier(0.4999, &bp), ConfidenceTier::Low);
        assert_eq!(confidence_tier(0.0, &bp), ConfidenceTier::Low);
    }

    #[test]
    fn tiers_are_monotonic() {
        let bp = ConfidenceBreakpoints {
            high: 0.9,
            medium: 0.3,
        };
        let mut last = ConfidenceTier::Low;
        for k in 0..=100 {
            let tier = confidence_tier(k as f64 / 100.0, &bp);
            assert!(tier >= last, "tier dropped at {k}");
            last = tier;
        }
        assert_eq!(last, ConfidenceTier::High);
    }

    #[test]
    fn priority_normalises_against_run_extremes() {
        let inputs = [
            PriorityInput {
                probability: 1.0,
                depth_std: 4.0,
                pixel_count: 50,
            },
            PriorityInput {
                probability: 0.6,
                depth_std: 1.0,
                pixel_count: 10,
            },
            PriorityInput {
                probability: 0.7,
                depth_std: 0.0,
                pixel_count: 25,
            },
        ];
        let p = qc_priorities(&inputs, &PriorityWeights::default());
        assert!((p[0] - 1.0).abs() < 1e-12);
        assert!((p[1] - (0.3 + 0.3 * 0.25 + 0.2 * 0.2)).abs() < 1e-12);
        assert!((p[2] - (0.35 + 0.0 + 0.2 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn zero_extremes_do_not_divide_by_zero() {
        let inputs = [PriorityInput {
            probability: 0.9,
            depth_std: 0.0,
            pixel_count: 0,
        }];
        let p = qc_priorities(&inputs, &PriorityWeights::default());
        assert!((p[0] - 0.45).abs() < 1e-12);
    }
}

//! Run bookkeeping: status, persisted record and dashboard summary.
use crate::anomaly::{Anomaly, AnomalyType, ConfidenceTier, ReviewDecision};
use crate::config::RunConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// `Pending → Processing → Completed | Failed | Cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Counts shown on the run dashboard.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub by_type: BTreeMap<AnomalyType, usize>,
    pub by_decision: BTreeMap<String, usize>,
    pub mean_probability: f64,
}

impl RunSummary {
    pub fn from_anomalies(anomalies: &[Anomaly]) -> Self {
        let mut summary = RunSummary {
            total: anomalies.len(),
            ..Default::default()
        };
        for a in anomalies {
            match a.confidence {
                ConfidenceTier::High => summary.high += 1,
                ConfidenceTier::Medium => summary.medium += 1,
                ConfidenceTier::Low => summary.low += 1,
            }
            *summary.by_type.entry(a.anomaly_type).or_default() += 1;
            *summary.by_decision.entry(a.decision.to_string()).or_default() += 1;
        }
        if !anomalies.is_empty() {
            summary.mean_probability =
                anomalies.iter().map(|a| a.probability).sum::<f64>() / anomalies.len() as f64;
        }
        summary
    }

    pub fn count(&self, tier: ConfidenceTier) -> usize {
        match tier {
            ConfidenceTier::High => self.high,
            ConfidenceTier::Medium => self.medium,
            ConfidenceTier::Low => self.low,
        }
    }

    pub fn decided(&self, decision: ReviewDecision) -> usize {
        self.by_decision
            .get(&decision.to_string())
            .copied()
            .unwrap_or(0)
    }
}

/// Everything stored about a run apart from its rasters and anomalies.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: Uuid,
    pub status: RunStatus,
    pub config_hash: String,
    pub config: RunConfig,
    pub model_version: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: RunSummary,
}

impl RunRecord {
    pub(crate) fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}

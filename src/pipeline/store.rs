//! In-memory home of completed runs and their review state.
//!
//! Only finished runs enter the store: a completed run with its anomalies and
//! rasters, or a failed/cancelled run as a bare record with the error message.
//! Decisions live in the [`ReviewLedger`]; anomaly lists and summaries read
//! them back on every query so they never go stale.
use super::{CancelToken, QcPipeline, RunOutput, RunRecord, RunStatus, RunSummary};
use crate::anomaly::{Anomaly, ConfidenceTier, ReviewDecision};
use crate::detect::ScoreGrid;
use crate::diagnostics::RunTrace;
use crate::error::{QcError, ReviewError};
use crate::features::FeatureSet;
use crate::grid::DepthGrid;
use crate::review::{ReviewLedger, ReviewLogEntry};
use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

struct StoredRun {
    record: RunRecord,
    anomalies: Vec<Anomaly>,
    scores: Option<Arc<ScoreGrid>>,
    features: Option<Arc<FeatureSet>>,
    trace: Option<Arc<RunTrace>>,
}

#[derive(Default)]
pub struct QcStore {
    runs: RwLock<HashMap<Uuid, StoredRun>>,
    ledger: ReviewLedger,
}

impl QcStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run synchronously and store the outcome either way.
    pub fn execute(&self, pipeline: &QcPipeline, grid: &DepthGrid) -> Result<Uuid, QcError> {
        self.execute_with_cancel(pipeline, grid, &CancelToken::new())
    }

    pub fn execute_with_cancel(
        &self,
        pipeline: &QcPipeline,
        grid: &DepthGrid,
        cancel: &CancelToken,
    ) -> Result<Uuid, QcError> {
        let run_id = Uuid::new_v4();
        let pending = pipeline.pending_record(run_id);
        match pipeline.run_with_cancel(run_id, grid, cancel) {
            Ok(output) => Ok(self.commit(output)),
            Err(err) => {
                self.record_failure(pending, &err);
                Err(err)
            }
        }
    }

    /// Store a completed run and open its anomalies for review.
    pub fn commit(&self, output: RunOutput) -> Uuid {
        let RunOutput {
            record,
            anomalies,
            scores,
            features,
            trace,
        } = output;
        let run_id = record.id;
        self.ledger
            .register_run(run_id, &anomalies, &record.model_version, &record.config_hash);
        self.runs.write().unwrap_or_else(PoisonError::into_inner).insert(
            run_id,
            StoredRun {
                record,
                anomalies,
                scores: Some(Arc::new(scores)),
                features: Some(Arc::new(features)),
                trace: Some(Arc::new(trace)),
            },
        );
        run_id
    }

    /// Keep the record of a run that produced nothing.
    pub fn record_failure(&self, mut record: RunRecord, err: &QcError) {
        let status = if err.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };
        warn!("run {} {:?}: {err}", record.id, status);
        record.finish(status, Some(err.to_string()));
        record.summary = RunSummary::default();
        self.runs.write().unwrap_or_else(PoisonError::into_inner).insert(
            record.id,
            StoredRun {
                record,
                anomalies: Vec::new(),
                scores: None,
                features: None,
                trace: None,
            },
        );
    }

    fn with_run<T>(
        &self,
        run_id: Uuid,
        f: impl FnOnce(&StoredRun) -> T,
    ) -> Result<T, ReviewError> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(&run_id).map(f).ok_or(ReviewError::UnknownRun(run_id))
    }

    fn refresh(&self, mut anomaly: Anomaly) -> Anomaly {
        if let Ok(decision) = self.ledger.decision(anomaly.id) {
            anomaly.decision = decision;
        }
        anomaly
    }

    fn current(&self, anomalies: Vec<Anomaly>) -> Vec<Anomaly> {
        anomalies.into_iter().map(|a| self.refresh(a)).collect()
    }

    /// Record with its summary reflecting current decisions.
    pub fn run(&self, run_id: Uuid) -> Result<RunRecord, ReviewError> {
        let (mut record, anomalies) =
            self.with_run(run_id, |run| (run.record.clone(), run.anomalies.clone()))?;
        if record.status == RunStatus::Completed {
            record.summary = RunSummary::from_anomalies(&self.current(anomalies));
        }
        Ok(record)
    }

    pub fn run_ids(&self) -> Vec<Uuid> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<&RunRecord> = runs.values().map(|r| &r.record).collect();
        records.sort_by_key(|r| r.started_at);
        records.iter().map(|r| r.id).collect()
    }

    /// Review queue: priority descending, ties by creation order.
    pub fn anomalies_by_priority(&self, run_id: Uuid) -> Result<Vec<Anomaly>, ReviewError> {
        let anomalies = self.with_run(run_id, |run| run.anomalies.clone())?;
        Ok(self.current(anomalies))
    }

    pub fn anomalies_where(
        &self,
        run_id: Uuid,
        tier: Option<ConfidenceTier>,
        decision: Option<ReviewDecision>,
    ) -> Result<Vec<Anomaly>, ReviewError> {
        Ok(self
            .anomalies_by_priority(run_id)?
            .into_iter()
            .filter(|a| tier.map_or(true, |t| a.confidence == t))
            .filter(|a| decision.map_or(true, |d| a.decision == d))
            .collect())
    }

    pub fn anomaly(&self, anomaly_id: Uuid) -> Option<Anomaly> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let found = runs
            .values()
            .flat_map(|run| run.anomalies.iter())
            .find(|a| a.id == anomaly_id)
            .cloned();
        drop(runs);
        found.map(|a| self.refresh(a))
    }

    pub fn summary(&self, run_id: Uuid) -> Result<RunSummary, ReviewError> {
        Ok(self.run(run_id)?.summary)
    }

    pub fn score_grid(&self, run_id: Uuid) -> Option<Arc<ScoreGrid>> {
        self.with_run(run_id, |run| run.scores.clone()).ok().flatten()
    }

    pub fn feature_set(&self, run_id: Uuid) -> Option<Arc<FeatureSet>> {
        self.with_run(run_id, |run| run.features.clone()).ok().flatten()
    }

    pub fn trace(&self, run_id: Uuid) -> Option<Arc<RunTrace>> {
        self.with_run(run_id, |run| run.trace.clone()).ok().flatten()
    }

    pub fn ledger(&self) -> &ReviewLedger {
        &self.ledger
    }

    pub fn submit_review(
        &self,
        anomaly_id: Uuid,
        decision: ReviewDecision,
        comment: Option<&str>,
        reviewer: &str,
    ) -> Result<ReviewLogEntry, ReviewError> {
        self.ledger.submit_review(anomaly_id, decision, comment, reviewer)
    }

    pub fn submit_bulk(
        &self,
        anomaly_ids: &[Uuid],
        decision: ReviewDecision,
        comment: Option<&str>,
        reviewer: &str,
    ) -> Vec<(Uuid, Result<ReviewLogEntry, ReviewError>)> {
        self.ledger.submit_bulk(anomaly_ids, decision, comment, reviewer)
    }

    pub fn history(&self, anomaly_id: Uuid) -> Result<Vec<ReviewLogEntry>, ReviewError> {
        self.ledger.history(anomaly_id)
    }
}

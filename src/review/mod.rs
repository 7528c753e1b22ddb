//! Review ledger: the only state shared between concurrent reviewers.
//!
//! Overview
//! - Every registered anomaly owns a slot guarded by its own mutex. A review
//!   locks the slot, checks that the decision is still pending, writes the
//!   new decision and appends exactly one [`ReviewLogEntry`] before the lock
//!   is released. Two reviewers racing on one anomaly therefore see one
//!   success and one [`ReviewError::Conflict`].
//! - `Accepted` and `Rejected` are terminal; there is no path back to
//!   pending and no way to overwrite a decision.
//! - The log is append-only. Entries carry a global sequence number that
//!   matches their position in the log.
//!
//! Bulk reviews apply the single-anomaly rule per id and report one result per
//! id, in input order; a failure never rolls back or blocks its neighbours.
use crate::anomaly::{Anomaly, ReviewDecision};
use crate::error::ReviewError;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

/// One immutable row of the review log.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLogEntry {
    pub id: Uuid,
    /// Position in the ledger-wide log.
    pub sequence: u64,
    pub anomaly_id: Uuid,
    pub run_id: Uuid,
    pub decision: ReviewDecision,
    pub previous_decision: ReviewDecision,
    pub comment: Option<String>,
    pub reviewer: String,
    /// Probability the reviewer was shown.
    pub anomaly_probability: f64,
    pub model_version: String,
    pub config_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ReviewSlot {
    run_id: Uuid,
    probability: f64,
    model_version: String,
    config_hash: String,
    decision: ReviewDecision,
}

#[derive(Debug, Default)]
pub struct ReviewLedger {
    slots: RwLock<HashMap<Uuid, Arc<Mutex<ReviewSlot>>>>,
    runs: RwLock<HashMap<Uuid, Vec<Uuid>>>,
    log: RwLock<Vec<ReviewLogEntry>>,
}

impl ReviewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a run's anomalies reviewable. Anomalies already known keep their
    /// current decision.
    pub fn register_run(
        &self,
        run_id: Uuid,
        anomalies: &[Anomaly],
        model_version: &str,
        config_hash: &str,
    ) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let ids = runs.entry(run_id).or_default();
        for anomaly in anomalies {
            if slots.contains_key(&anomaly.id) {
                continue;
            }
            slots.insert(
                anomaly.id,
                Arc::new(Mutex::new(ReviewSlot {
                    run_id,
                    probability: anomaly.probability,
                    model_version: model_version.to_string(),
                    config_hash: config_hash.to_string(),
                    decision: anomaly.decision,
                })),
            );
            ids.push(anomaly.id);
        }
        debug!(
            "ReviewLedger::register_run run={run_id} anomalies={}",
            anomalies.len()
        );
    }

    fn slot(&self, anomaly_id: Uuid) -> Result<Arc<Mutex<ReviewSlot>>, ReviewError> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&anomaly_id)
            .cloned()
            .ok_or(ReviewError::UnknownAnomaly(anomaly_id))
    }

    /// Move a pending anomaly to `decision` and log the transition.
    pub fn submit_review(
        &self,
        anomaly_id: Uuid,
        decision: ReviewDecision,
        comment: Option<&str>,
        reviewer: &str,
    ) -> Result<ReviewLogEntry, ReviewError> {
        if !decision.is_terminal() {
            return Err(ReviewError::PendingNotAllowed);
        }
        let slot = self.slot(anomaly_id)?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.decision.is_terminal() {
            return Err(ReviewError::Conflict {
                anomaly_id,
                current: slot.decision,
            });
        }

        let previous = slot.decision;
        slot.decision = decision;
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        let entry = ReviewLogEntry {
            id: Uuid::new_v4(),
            sequence: log.len() as u64,
            anomaly_id,
            run_id: slot.run_id,
            decision,
            previous_decision: previous,
            comment: comment.map(str::to_string),
            reviewer: reviewer.to_string(),
            anomaly_probability: slot.probability,
            model_version: slot.model_version.clone(),
            config_hash: slot.config_hash.clone(),
            created_at: Utc::now(),
        };
        log.push(entry.clone());
        info!("anomaly {anomaly_id} {decision} by {reviewer}");
        Ok(entry)
    }

    /// Review every id independently; results follow the input order.
    pub fn submit_bulk(
        &self,
        anomaly_ids: &[Uuid],
        decision: ReviewDecision,
        comment: Option<&str>,
        reviewer: &str,
    ) -> Vec<(Uuid, Result<ReviewLogEntry, ReviewError>)> {
        anomaly_ids
            .iter()
            .map(|&id| (id, self.submit_review(id, decision, comment, reviewer)))
            .collect()
    }

    pub fn decision(&self, anomaly_id: Uuid) -> Result<ReviewDecision, ReviewError> {
        let slot = self.slot(anomaly_id)?;
        let decision = slot.lock().unwrap_or_else(PoisonError::into_inner).decision;
        Ok(decision)
    }

    /// Entries for one anomaly, oldest first.
    pub fn history(&self, anomaly_id: Uuid) -> Result<Vec<ReviewLogEntry>, ReviewError> {
        self.slot(anomaly_id)?;
        Ok(self.entries_where(|e| e.anomaly_id == anomaly_id))
    }

    /// Entries for every anomaly of a run, oldest first.
    pub fn run_history(&self, run_id: Uuid) -> Result<Vec<ReviewLogEntry>, ReviewError> {
        if !self
            .runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&run_id)
        {
            return Err(ReviewError::UnknownRun(run_id));
        }
        Ok(self.entries_where(|e| e.run_id == run_id))
    }

    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries_where(&self, keep: impl Fn(&ReviewLogEntry) -> bool) -> Vec<ReviewLogEntry> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }
}

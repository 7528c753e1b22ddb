mod common;

use bathy_qc::{QcPipeline, QcStore, ReviewDecision, ReviewError, RunConfig};
use common::synthetic_grid::{init_logging, SurveyBuilder};
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

/// Store holding one completed run with three spike anomalies.
fn store_with_three_spikes() -> (QcStore, Uuid, Vec<Uuid>) {
    init_logging();
    let grid = SurveyBuilder::flat(60, 60, 30.0)
        .spike(12, 12, 500.0)
        .spike(12, 46, 500.0)
        .spike(46, 30, 500.0)
        .build();
    let store = QcStore::new();
    let pipeline = QcPipeline::new(RunConfig::default().frozen().unwrap());
    let run_id = store.execute(&pipeline, &grid).expect("run completes");
    let ids: Vec<Uuid> = store
        .anomalies_by_priority(run_id)
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids.len(), 3, "one anomaly per spike");
    (store, run_id, ids)
}

#[test]
fn review_is_logged_with_run_identity() {
    let (store, run_id, ids) = store_with_three_spikes();
    let record = store.run(run_id).unwrap();

    let entry = store
        .submit_review(ids[0], ReviewDecision::Accepted, Some("confirmed"), "surveyor-1")
        .unwrap();
    assert_eq!(entry.run_id, run_id);
    assert_eq!(entry.config_hash, record.config_hash);
    assert_eq!(entry.model_version, record.model_version);
    assert_eq!(entry.reviewer, "surveyor-1");

    let anomaly = store.anomaly(ids[0]).unwrap();
    assert_eq!(anomaly.decision, ReviewDecision::Accepted);
    assert_eq!(entry.anomaly_probability, anomaly.probability);
    assert_eq!(store.history(ids[0]).unwrap(), vec![entry]);

    let summary = store.summary(run_id).unwrap();
    assert_eq!(summary.decided(ReviewDecision::Accepted), 1);
    assert_eq!(summary.decided(ReviewDecision::Pending), 2);
}

#[test]
fn second_review_is_a_conflict() {
    let (store, _, ids) = store_with_three_spikes();
    store
        .submit_review(ids[1], ReviewDecision::Accepted, None, "a")
        .unwrap();
    let err = store
        .submit_review(ids[1], ReviewDecision::Rejected, None, "b")
        .unwrap_err();
    assert!(
        matches!(err, ReviewError::Conflict { current: ReviewDecision::Accepted, .. }),
        "{err:?}"
    );
    assert_eq!(store.history(ids[1]).unwrap().len(), 1);
}

#[test]
fn bulk_review_reports_two_successes_and_one_conflict() {
    let (store, run_id, ids) = store_with_three_spikes();
    store
        .submit_review(ids[2], ReviewDecision::Rejected, Some("sound velocity artefact"), "a")
        .unwrap();

    let results = store.submit_bulk(&ids, ReviewDecision::Accepted, None, "b");
    let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
    let conflicts: Vec<Uuid> = results
        .iter()
        .filter(|(_, r)| matches!(r, Err(ReviewError::Conflict { .. })))
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(ok, 2);
    assert_eq!(conflicts, vec![ids[2]]);

    let accepted = store
        .anomalies_where(run_id, None, Some(ReviewDecision::Accepted))
        .unwrap();
    assert_eq!(accepted.len(), 2);
    assert_eq!(
        store.anomaly(ids[2]).unwrap().decision,
        ReviewDecision::Rejected
    );
    assert_eq!(store.ledger().run_history(run_id).unwrap().len(), 3);
}

#[test]
fn concurrent_reviewers_cannot_both_win() {
    let (store, _, ids) = store_with_three_spikes();
    let store = Arc::new(store);
    let target = ids[0];

    let handles: Vec<_> = ["alice", "bob", "carol", "dave"]
        .into_iter()
        .map(|reviewer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.submit_review(target, ReviewDecision::Rejected, None, reviewer)
            })
        })
        .collect();
    let wins = handles
        .into_iter()
        .map(|h| h.join().expect("reviewer thread"))
        .filter(|r| r.is_ok())
        .count();

    assert_eq!(wins, 1);
    assert_eq!(store.history(target).unwrap().len(), 1);
}

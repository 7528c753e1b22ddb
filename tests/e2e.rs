mod common;

use bathy_qc::config::Connectivity;
use bathy_qc::raster::io::EXPORT_NODATA;
use bathy_qc::stages::{confidence_tier, FeatureKind};
use bathy_qc::{
    AnomalyType, DepthGrid, GeoTransform, InputError, QcError, QcPipeline, QcStore, RunConfig,
    RunJob, RunStatus,
};
use common::synthetic_grid::{init_logging, SurveyBuilder};
use std::sync::Arc;

fn default_pipeline() -> QcPipeline {
    QcPipeline::new(RunConfig::default().frozen().expect("defaults validate"))
}

fn spike_and_hole() -> DepthGrid {
    SurveyBuilder::flat(50, 50, 10.0)
        .spike(15, 35, 1000.0)
        .hole(30, 10, 3, 3)
        .build()
}

#[test]
fn spike_and_hole_are_reported() {
    init_logging();
    let grid = spike_and_hole();
    let out = default_pipeline().run(&grid).expect("run completes");

    assert_eq!(
        out.anomalies.len(),
        2,
        "expected one spike and one hole, got {:?}",
        out.anomalies
            .iter()
            .map(|a| (a.anomaly_type, a.probability, a.pixel_count))
            .collect::<Vec<_>>()
    );

    let spike = out
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::Spike)
        .expect("spike reported");
    assert!(
        spike.probability >= 0.8,
        "spike probability too low: {:.3}",
        spike.probability
    );
    let (r, c) = grid
        .transform()
        .cell_at(spike.centroid[0], spike.centroid[1], grid.rows(), grid.cols())
        .expect("spike centroid on the grid");
    assert_eq!((r, c), (15, 35), "spike centroid should sit on the spike cell");

    let hole = out
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::Hole)
        .expect("hole reported");
    let (r, c) = grid
        .transform()
        .cell_at(hole.centroid[0], hole.centroid[1], grid.rows(), grid.cols())
        .expect("hole centroid on the grid");
    assert!(
        (30..33).contains(&r) && (10..13).contains(&c),
        "hole centroid cell ({r}, {c}) outside the gap"
    );
    assert!(hole.polygon.contains(hole.centroid));
    assert_eq!(hole.pixel_count, 9);
    assert_eq!(out.summary().total, 2);
}

#[test]
fn flat_survey_yields_nothing_at_any_threshold() {
    init_logging();
    let grid = SurveyBuilder::flat(20, 20, 5.0).build();
    for threshold in [0.0, 0.3, 0.6, 1.0] {
        let mut cfg = RunConfig::default();
        cfg.polygon.detection_threshold = threshold;
        let out = QcPipeline::new(cfg.frozen().unwrap())
            .run(&grid)
            .expect("flat survey runs");
        assert!(
            out.anomalies.is_empty(),
            "threshold {threshold} produced {} anomalies",
            out.anomalies.len()
        );
    }
}

#[test]
fn identical_input_gives_identical_regions() {
    init_logging();
    let grid = spike_and_hole();
    let pipeline = default_pipeline();
    let a = pipeline.run(&grid).unwrap();
    let b = pipeline.run(&grid).unwrap();

    assert_eq!(a.anomalies.len(), b.anomalies.len());
    for (x, y) in a.anomalies.iter().zip(&b.anomalies) {
        assert_eq!(x.polygon, y.polygon);
        assert_eq!(x.probability, y.probability);
        assert_eq!(x.explanation, y.explanation);
        assert_eq!(x.qc_priority, y.qc_priority);
        assert_ne!(x.id, y.id, "every run mints fresh ids");
    }
    assert_eq!(
        a.scores.to_export_values(EXPORT_NODATA),
        b.scores.to_export_values(EXPORT_NODATA)
    );
    let bits = |out: &bathy_qc::RunOutput| -> Vec<u32> {
        out.scores.fused().data.iter().map(|v| v.to_bits()).collect()
    };
    assert_eq!(bits(&a), bits(&b), "fused scores differ bit for bit");
}

#[test]
fn features_are_nodata_only_near_the_border() {
    let r = 2;
    let grid = SurveyBuilder::flat(12, 15, 3.0).spike(6, 7, 9.0).build();
    let features = bathy_qc::stages::extract_features(&grid, r);
    for kind in FeatureKind::ALL {
        let layer = features.get(kind);
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                let near_border =
                    row < r || col < r || row + r >= grid.rows() || col + r >= grid.cols();
                assert_eq!(
                    layer.get(row, col).is_nan(),
                    near_border,
                    "{} at ({row}, {col})",
                    kind.name()
                );
            }
        }
    }
}

#[test]
fn every_anomaly_is_explained_and_tiered() {
    init_logging();
    let grid = SurveyBuilder::flat(60, 60, 20.0)
        .spike(15, 15, 60.0)
        .spike(15, 45, 400.0)
        .spike(45, 30, 25.0)
        .hole(40, 5, 4, 4)
        .build();
    let cfg = RunConfig::default();
    let min_pixels = cfg.polygon.min_pixels;
    let breakpoints = cfg.confidence.clone();
    let out = QcPipeline::new(cfg.frozen().unwrap()).run(&grid).unwrap();

    assert!(!out.anomalies.is_empty());
    for a in &out.anomalies {
        assert!(!a.explanation.is_empty(), "anomaly {} lacks an explanation", a.id);
        assert!(a.pixel_count >= min_pixels);
        assert_eq!(a.confidence, confidence_tier(a.probability, &breakpoints));
        assert!((0.0..=1.0).contains(&a.probability));
    }
    for pair in out.anomalies.windows(2) {
        assert!(
            pair[0].qc_priority > pair[1].qc_priority
                || (pair[0].qc_priority == pair[1].qc_priority
                    && pair[0].sequence < pair[1].sequence),
            "anomalies out of review order"
        );
    }
}

#[test]
fn four_connectivity_is_configurable() {
    let grid = spike_and_hole();
    let mut cfg = RunConfig::default();
    cfg.polygon.connectivity = Connectivity::Four;
    let out = QcPipeline::new(cfg.frozen().unwrap()).run(&grid).unwrap();
    assert!(out
        .anomalies
        .iter()
        .any(|a| a.anomaly_type == AnomalyType::Spike));
}

#[test]
fn input_errors_surface_their_cause() {
    let t = GeoTransform::new(0.0, 0.0, 1.0);
    assert_eq!(
        DepthGrid::new(3, 3, vec![1.0; 9], vec![false; 8], t, "").unwrap_err(),
        InputError::ShapeMismatch {
            what: "no-data mask",
            expected: 9,
            actual: 8
        }
    );
    assert_eq!(
        DepthGrid::new(3, 3, vec![1.0; 9], vec![true; 9], t, "").unwrap_err(),
        InputError::AllNoData
    );
    assert_eq!(
        DepthGrid::new(0, 3, vec![], vec![], t, "").unwrap_err(),
        InputError::Empty
    );

    let err = default_pipeline()
        .run(&SurveyBuilder::flat(3, 40, 1.0).build())
        .unwrap_err();
    assert!(matches!(err, QcError::Input(InputError::GridTooSmall { .. })), "{err:?}");
}

#[test]
fn failed_and_cancelled_runs_persist_nothing() {
    init_logging();
    let store = QcStore::new();

    let err = store
        .execute(&default_pipeline(), &SurveyBuilder::flat(8, 8, 4.0).build())
        .unwrap_err();
    assert!(matches!(err, QcError::ModelFit(_)), "{err:?}");

    let token = bathy_qc::CancelToken::new();
    token.cancel();
    let err = store
        .execute_with_cancel(&default_pipeline(), &spike_and_hole(), &token)
        .unwrap_err();
    assert!(err.is_cancelled());

    let ids = store.run_ids();
    assert_eq!(ids.len(), 2);
    let statuses: Vec<RunStatus> = ids
        .iter()
        .map(|&id| store.run(id).unwrap().status)
        .collect();
    assert!(statuses.contains(&RunStatus::Failed));
    assert!(statuses.contains(&RunStatus::Cancelled));
    for id in ids {
        let record = store.run(id).unwrap();
        assert!(record.error.is_some());
        assert_eq!(record.summary.total, 0);
        assert!(store.anomalies_by_priority(id).unwrap().is_empty());
        assert!(store.score_grid(id).is_none());
    }
}

#[test]
fn background_job_completes_into_the_store() {
    init_logging();
    let store = QcStore::new();
    let job = RunJob::spawn(default_pipeline(), Arc::new(spike_and_hole()));
    let job_id = job.run_id();
    let run_id = job.wait_into(&store).expect("job completes");
    assert_eq!(run_id, job_id);

    let record = store.run(run_id).unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.summary.total, 2);

    let scores = store.score_grid(run_id).expect("scores kept");
    let export = scores.to_export_values(EXPORT_NODATA);
    assert_eq!(export.len(), 50 * 50);
    assert_eq!(export[0], EXPORT_NODATA);
    assert!(export.iter().all(|v| v.is_finite()));
    assert!(store.feature_set(run_id).is_some());
    assert!(store.trace(run_id).is_some());
}

#[test]
fn cancelling_a_background_job_discards_its_output() {
    init_logging();
    let store = QcStore::new();
    let grid = SurveyBuilder::flat(300, 300, 40.0)
        .spike(100, 100, 90.0)
        .spike(200, 150, 10.0)
        .hole(250, 40, 5, 5)
        .build();
    let job = RunJob::spawn(default_pipeline(), Arc::new(grid));
    let run_id = job.run_id();
    job.cancel();

    let err = job.wait_into(&store).unwrap_err();
    assert_eq!(err, QcError::Cancelled(run_id));

    let record = store.run(run_id).expect("cancelled run keeps its record");
    assert_eq!(record.status, RunStatus::Cancelled);
    assert!(record.error.is_some());
    assert!(record.completed_at.is_some());
    assert_eq!(record.summary.total, 0);
    assert!(store.anomalies_by_priority(run_id).unwrap().is_empty());
    assert!(store.score_grid(run_id).is_none());
    assert!(store.feature_set(run_id).is_none());
}

#[test]
fn failed_run_record_keeps_its_start_time() {
    init_logging();
    // Large sparse survey: features run over every cell, then the fit fails.
    let (rows, cols) = (1000, 1000);
    let mut nodata = vec![true; rows * cols];
    for r in 500..505 {
        for c in 500..505 {
            nodata[r * cols + c] = false;
        }
    }
    let grid = DepthGrid::new(
        rows,
        cols,
        vec![12.0; rows * cols],
        nodata,
        GeoTransform::new(0.0, 0.0, 1.0),
        "",
    )
    .unwrap();

    let store = QcStore::new();
    let before = chrono::Utc::now();
    let start = std::time::Instant::now();
    let err = store.execute(&default_pipeline(), &grid).unwrap_err();
    let elapsed_us = start.elapsed().as_micros() as i64;
    assert!(matches!(err, QcError::ModelFit(_)), "{err:?}");

    let id = store.run_ids()[0];
    let record = store.run(id).unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    let completed = record.completed_at.expect("failed run is finished");
    assert!(record.started_at >= before, "start stamped before the call");
    let span_us = (completed - record.started_at)
        .num_microseconds()
        .unwrap_or(i64::MAX);
    assert!(
        span_us * 2 >= elapsed_us,
        "record spans {span_us} us of a {elapsed_us} us run"
    );
}

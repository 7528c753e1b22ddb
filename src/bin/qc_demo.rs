use bathy_qc::config::demo::{self, QcDemoConfig};
use bathy_qc::diagnostics::RunTrace;
use bathy_qc::raster::io::{save_heatmap_png, write_json_file, EXPORT_NODATA};
use bathy_qc::{Anomaly, QcPipeline, RunRecord, RunSummary};
use serde::Serialize;
use std::env;
use std::path::Path;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    record: &'a RunRecord,
    summary: &'a RunSummary,
    trace: &'a RunTrace,
    export_nodata: f32,
    anomalies: &'a [Anomaly],
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config: QcDemoConfig = demo::load_config(Path::new(&config_path))?;
    let run = config.resolve_run()?;
    let QcDemoConfig { input, output, .. } = config;

    let grid = input.load()?;
    let frozen = run.frozen().map_err(|e| e.to_string())?;
    let pipeline = QcPipeline::new(frozen);
    let out = pipeline.run(&grid).map_err(|e| e.to_string())?;

    let report = RunReport {
        record: &out.record,
        summary: out.summary(),
        trace: &out.trace,
        export_nodata: EXPORT_NODATA,
        anomalies: &out.anomalies,
    };
    write_json_file(&output.report_json, &report)?;
    if let Some(png) = &output.heatmap_png {
        save_heatmap_png(out.scores.fused(), png)?;
    }

    let s = out.summary();
    println!(
        "Saved report to {} (anomalies={} high={} medium={} low={})",
        output.report_json.display(),
        s.total,
        s.high,
        s.medium,
        s.low
    );
    Ok(())
}

fn usage() -> String {
    "Usage: qc_demo <config.json>".to_string()
}

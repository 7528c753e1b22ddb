use bathy_qc::config::demo::SyntheticSurvey;
use bathy_qc::prelude::*;

fn main() {
    env_logger::init();
    // Demo: a sloping synthetic survey with one spike and one no-data hole.
    let grid = match SyntheticSurvey::default().build() {
        Ok(grid) => grid,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    let pipeline = match RunConfig::default().frozen() {
        Ok(config) => QcPipeline::new(config),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    match pipeline.run(&grid) {
        Ok(out) => {
            let s = out.summary();
            println!(
                "anomalies={} high={} medium={} low={} latency_ms={:.3}",
                s.total, s.high, s.medium, s.low, out.trace.timings.total_ms
            );
            for a in &out.anomalies {
                println!(
                    "  {:<13} p={:.2} priority={:.2} centroid=({:.1}, {:.1}) {}",
                    a.anomaly_type.name(),
                    a.probability,
                    a.qc_priority,
                    a.centroid[0],
                    a.centroid[1],
                    a.explanation.primary_reason
                );
            }
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

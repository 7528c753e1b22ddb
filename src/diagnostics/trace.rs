use super::TimingBreakdown;
use crate::error::GeometryError;
use crate::grid::DatasetStats;
use serde::Serialize;

/// Shape and coverage of the grid a run consumed.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub rows: usize,
    pub cols: usize,
    pub cell_size: f64,
    pub crs: String,
    pub stats: DatasetStats,
}

/// Component labelled by the polygonizer but not turned into an anomaly.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryWarning {
    pub label: usize,
    pub reason: String,
}

impl From<&GeometryError> for GeometryWarning {
    fn from(err: &GeometryError) -> Self {
        match err {
            GeometryError::Degenerate { label, reason } => Self {
                label: *label,
                reason: reason.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStage {
    /// Valid feature cells the detectors were fitted on.
    pub fit_cells: usize,
    pub cells_above_threshold: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonStage {
    pub components: usize,
    pub below_min_pixels: usize,
    pub coverage_gaps: usize,
    pub anomalies: usize,
    pub warnings: Vec<GeometryWarning>,
}

/// What a run did, stage by stage.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTrace {
    pub input: InputDescriptor,
    pub timings: TimingBreakdown,
    pub detection: DetectionStage,
    pub polygons: PolygonStage,
}

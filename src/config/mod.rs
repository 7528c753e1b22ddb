//! Configuration: the validated run config and the demo tool config.
pub mod demo;
pub mod run;

pub use run::{
    load_run_config, ConfidenceBreakpoints, Connectivity, FeatureOptions, ForestOptions,
    FrozenConfig, FusionWeights, PolygonOptions, PriorityWeights, RobustOptions, RunConfig,
    MODEL_VERSION,
};

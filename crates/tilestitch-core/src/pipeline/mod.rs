pub mod config;
mod orchestrator;
mod types;

pub use orchestrator::{run_stitch, run_stitch_reported};
pub use types::{NoOpReporter, ProgressReporter, StitchOutput, StitchStage};

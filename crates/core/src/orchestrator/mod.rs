//! Pipeline orchestrator.
//!
//! Turns submissions into independent pipelines:
//! - Acquisition: latch the submitted job in the engine's job list and follow it
//! - Handoff: once the download completes, retire the acquisition loop
//! - Conversion: poll the remote transcoder until it reports completion

mod pipeline;
mod runner;
mod types;

pub use runner::PipelineOrchestrator;
pub use types::{
    resolve_destination, OrchestratorError, PipelineHandle, PipelineRequest, PipelineSummary,
};

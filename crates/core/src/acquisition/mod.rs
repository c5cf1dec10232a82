//! Acquisition stage: find the submitted job in the engine and follow it to completion.

mod poller;
mod target;
mod tracker;

pub use poller::AcquisitionPoller;
pub use target::{Observation, TargetAcquisition};
pub use tracker::{AcquisitionTracker, TrackerPhase};

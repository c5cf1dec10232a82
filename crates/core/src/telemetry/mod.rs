//! Conversion stage telemetry: what the remote transcoder is doing right now.

pub mod parser;
mod poller;
mod types;

pub use parser::{classify_phase, classify_subtitles, parse_progress};
pub use poller::TelemetryPoller;
pub use types::*;

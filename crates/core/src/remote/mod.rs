//! Remote command execution on the conversion host.

mod commands;
mod ssh;
mod types;

pub use commands::{sanitize_title, TelemetryQueries};
pub use ssh::{SshExecutor, SshProvider};
pub use types::*;

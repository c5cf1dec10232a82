//! Download engine abstraction.
//!
//! Provides a trait-based interface over the engine that actually fetches
//! payloads. The pipeline only observes it: log in, list jobs, enqueue.

mod qbittorrent;
mod types;

pub use qbittorrent::{QBittorrentEngine, QBittorrentProvider};
pub use types::*;

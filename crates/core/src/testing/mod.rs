//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the engine and remote-shell
//! traits, allowing full pipeline tests without a download engine or a
//! conversion host.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediaflow_core::testing::{fixtures, MockDownloadEngine, MockRemoteExecutor};
//!
//! let engine = MockDownloadEngine::new();
//! let remote = MockRemoteExecutor::new();
//!
//! engine.appear_on_submit(fixtures::job("abc", 0.0, JobState::Downloading)).await;
//! remote.respond_to("sqlite3", Some("CONVERTING")).await;
//! ```

mod mock_engine;
mod mock_remote;

pub use mock_engine::{MockDownloadEngine, RecordedSubmission};
pub use mock_remote::MockRemoteExecutor;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::engine::{JobId, JobRecord, JobSnapshot, JobState};

    /// Create a job record with reasonable defaults.
    pub fn job(id: &str, progress: f64, state: JobState) -> JobRecord {
        JobRecord {
            id: JobId::from(id),
            name: format!("Job {}", id),
            state,
            raw_state: state.as_str().to_string(),
            progress,
            size_bytes: 1024 * 1024 * 700, // 700 MB
            download_speed: 1024 * 512,
            upload_speed: 0,
            eta_secs: None,
            peers: 4,
            seeds: 12,
            ratio: 0.0,
            category: None,
            tags: vec![],
            added_at: None,
            availability: 5.0,
            save_path: None,
        }
    }

    /// Create a named job record.
    pub fn named_job(id: &str, name: &str, progress: f64, state: JobState) -> JobRecord {
        JobRecord {
            name: name.to_string(),
            ..job(id, progress, state)
        }
    }

    /// Snapshot of downloading jobs with the given identifiers, in order.
    pub fn snapshot(ids: &[&str]) -> JobSnapshot {
        JobSnapshot::new(
            ids.iter()
                .map(|id| job(id, 0.0, JobState::Downloading))
                .collect(),
        )
    }

    /// An ffmpeg log with a total duration and one progress line per position.
    pub fn ffmpeg_log(duration_secs: u64, positions_secs: &[u64]) -> String {
        let hms = |s: u64| format!("{:02}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60);
        let mut log = format!(
            "Input #0, matroska,webm, from 'input.mkv':\n  Duration: {}.00, start: 0.000000, bitrate: 4000 kb/s\n",
            hms(duration_secs)
        );
        for position in positions_secs {
            log.push_str(&format!(
                "frame= 100 fps=30 q=28.0 size=  1024kB time={}.00 bitrate= 800.0kbits/s speed=2.0x\n",
                hms(*position)
            ));
        }
        log
    }
}

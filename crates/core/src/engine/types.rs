//! Types for download engine operations.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the download engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error came from rejected credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, EngineError::AuthenticationFailed(_))
    }
}

/// Opaque identifier the engine assigns to a job (an info hash for qBittorrent).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// State of a job as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Fetching data from peers.
    Downloading,
    /// Download is stuck (no peers).
    Stalled,
    /// Download finished, uploading to peers.
    Seeding,
    /// Download finished, nobody to upload to.
    StalledUpload,
    /// Download finished, then paused.
    PausedComplete,
    /// Engine reports the job as completed.
    Completed,
    /// Engine error.
    Error,
    /// Downloaded files disappeared from disk.
    MissingFiles,
    /// Anything else (queued, checking, paused mid-download, ...).
    Other,
}

impl JobState {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Downloading => "downloading",
            JobState::Stalled => "stalled",
            JobState::Seeding => "seeding",
            JobState::StalledUpload => "stalled_upload",
            JobState::PausedComplete => "paused_complete",
            JobState::Completed => "completed",
            JobState::Error => "error",
            JobState::MissingFiles => "missing_files",
            JobState::Other => "other",
        }
    }

    /// States that imply the payload is fully on disk.
    pub fn is_download_complete(&self) -> bool {
        matches!(
            self,
            JobState::Seeding
                | JobState::StalledUpload
                | JobState::PausedComplete
                | JobState::Completed
        )
    }

    /// States the dashboard renders as failures.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Error | JobState::MissingFiles)
    }
}

/// One job as seen in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    /// The engine's own state string, kept for display.
    pub raw_state: String,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    pub size_bytes: u64,
    /// Current download speed in bytes/second.
    pub download_speed: u64,
    /// Current upload speed in bytes/second.
    pub upload_speed: u64,
    /// ETA in seconds (None if unknown or complete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
    pub peers: u32,
    pub seeds: u32,
    pub ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    /// Distributed copies available in the swarm (negative when unknown).
    pub availability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
}

impl JobRecord {
    /// Progress as a whole percentage, floored and clamped to 0..=100.
    pub fn progress_percent(&self) -> u8 {
        if !self.progress.is_finite() || self.progress <= 0.0 {
            return 0;
        }
        (self.progress * 100.0).floor().min(100.0) as u8
    }

    /// Acquisition-stage completion predicate.
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0 || self.state.is_download_complete()
    }
}

/// Point-in-time listing of every job the engine knows about, in engine order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    jobs: Vec<JobRecord>,
    taken_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn new(jobs: Vec<JobRecord>) -> Self {
        Self {
            jobs,
            taken_at: Utc::now(),
        }
    }

    pub fn jobs(&self) -> &[JobRecord] {
        &self.jobs
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Identifiers in listing order.
    pub fn identifiers(&self) -> impl Iterator<Item = &JobId> {
        self.jobs.iter().map(|j| &j.id)
    }

    /// Identifier census as an owned set.
    pub fn identifier_set(&self) -> HashSet<JobId> {
        self.identifiers().cloned().collect()
    }

    pub fn get(&self, id: &JobId) -> Option<&JobRecord> {
        self.jobs.iter().find(|j| &j.id == id)
    }
}

/// What gets handed to the engine.
#[derive(Debug, Clone)]
pub enum JobPayload {
    /// Add via magnet URI.
    Magnet { uri: String },
    /// Add via .torrent file contents.
    TorrentFile {
        data: Vec<u8>,
        /// Original filename (for logging).
        filename: Option<String>,
    },
}

impl JobPayload {
    pub fn magnet(uri: impl Into<String>) -> Self {
        JobPayload::Magnet { uri: uri.into() }
    }

    pub fn torrent_file(data: Vec<u8>) -> Self {
        JobPayload::TorrentFile {
            data,
            filename: None,
        }
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        if let JobPayload::TorrentFile { filename, .. } = &mut self {
            *filename = Some(name.into());
        }
        self
    }

    /// Short description for logs; never includes file contents.
    pub fn describe(&self) -> String {
        match self {
            JobPayload::Magnet { uri } => {
                format!("magnet ({})", uri.chars().take(60).collect::<String>())
            }
            JobPayload::TorrentFile { data, filename } => format!(
                "torrent file {} ({} bytes)",
                filename.as_deref().unwrap_or("<unnamed>"),
                data.len()
            ),
        }
    }
}

/// Trait for download engine backends.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Log in (or re-validate the session).
    async fn authenticate(&self) -> Result<(), EngineError>;

    /// Fetch the full job list.
    async fn list_jobs(&self) -> Result<JobSnapshot, EngineError>;

    /// Enqueue a new job saving into `destination`.
    async fn submit_job(&self, payload: &JobPayload, destination: &str)
        -> Result<(), EngineError>;
}

/// Builds independent engine connections, one per loop.
pub trait EngineProvider: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn DownloadEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, progress: f64, state: JobState) -> JobRecord {
        JobRecord {
            id: JobId::from(id),
            name: format!("job {}", id),
            state,
            raw_state: state.as_str().to_string(),
            progress,
            size_bytes: 1024,
            download_speed: 0,
            upload_speed: 0,
            eta_secs: None,
            peers: 0,
            seeds: 0,
            ratio: 0.0,
            category: None,
            tags: vec![],
            added_at: None,
            availability: -1.0,
            save_path: None,
        }
    }

    #[test]
    fn test_job_state_as_str() {
        assert_eq!(JobState::Downloading.as_str(), "downloading");
        assert_eq!(JobState::StalledUpload.as_str(), "stalled_upload");
        assert_eq!(JobState::PausedComplete.as_str(), "paused_complete");
        assert_eq!(JobState::MissingFiles.as_str(), "missing_files");
    }

    #[test]
    fn test_job_state_serialization() {
        assert_eq!(
            serde_json::to_string(&JobState::Seeding).unwrap(),
            "\"seeding\""
        );
        assert_eq!(
            serde_json::to_string(&JobState::PausedComplete).unwrap(),
            "\"paused_complete\""
        );
    }

    #[test]
    fn test_download_complete_states() {
        assert!(JobState::Seeding.is_download_complete());
        assert!(JobState::StalledUpload.is_download_complete());
        assert!(JobState::PausedComplete.is_download_complete());
        assert!(JobState::Completed.is_download_complete());
        assert!(!JobState::Downloading.is_download_complete());
        assert!(!JobState::Stalled.is_download_complete());
        assert!(!JobState::Error.is_download_complete());
        assert!(!JobState::Other.is_download_complete());
    }

    #[test]
    fn test_failure_states() {
        assert!(JobState::Error.is_failure());
        assert!(JobState::MissingFiles.is_failure());
        assert!(!JobState::Downloading.is_failure());
        assert!(!JobState::Seeding.is_failure());
    }

    #[test]
    fn test_progress_percent_floors_and_clamps() {
        assert_eq!(record("a", 0.0, JobState::Downloading).progress_percent(), 0);
        assert_eq!(record("a", 0.999, JobState::Downloading).progress_percent(), 99);
        assert_eq!(record("a", 1.0, JobState::Downloading).progress_percent(), 100);
        assert_eq!(record("a", 1.7, JobState::Downloading).progress_percent(), 100);
        assert_eq!(record("a", -0.2, JobState::Downloading).progress_percent(), 0);
        assert_eq!(record("a", f64::NAN, JobState::Downloading).progress_percent(), 0);
    }

    #[test]
    fn test_is_complete_by_progress_or_state() {
        assert!(record("a", 1.0, JobState::Downloading).is_complete());
        assert!(record("a", 0.3, JobState::PausedComplete).is_complete());
        assert!(!record("a", 0.99, JobState::Downloading).is_complete());
    }

    #[test]
    fn test_snapshot_preserves_listing_order() {
        let snapshot = JobSnapshot::new(vec![
            record("b", 0.0, JobState::Downloading),
            record("c", 0.0, JobState::Downloading),
            record("a", 0.0, JobState::Downloading),
        ]);
        let ids: Vec<&str> = snapshot.identifiers().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(snapshot.get(&JobId::from("a")).is_some());
        assert!(snapshot.get(&JobId::from("z")).is_none());
        assert_eq!(snapshot.identifier_set().len(), 3);
    }

    #[test]
    fn test_payload_describe_omits_contents() {
        let payload = JobPayload::torrent_file(vec![0u8; 42]).with_filename("movie.torrent");
        assert_eq!(payload.describe(), "torrent file movie.torrent (42 bytes)");

        let magnet = JobPayload::magnet("magnet:?xt=urn:btih:abc");
        assert!(magnet.describe().starts_with("magnet ("));
    }

    #[test]
    fn test_job_record_serialization_skips_empty_fields() {
        let json = serde_json::to_value(record("abc", 0.5, JobState::Downloading)).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["state"], "downloading");
        assert!(json.get("eta_secs").is_none());
        assert!(json.get("tags").is_none());
    }
}

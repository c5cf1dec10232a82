//! Types for the pipeline orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::engine::{EngineError, JobId, JobPayload};
use crate::events::{PipelineEvent, PipelineId, PipelineStage};
use crate::telemetry::SubtitlePhase;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request was rejected before anything was sent to the engine.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Download engine error during submission.
    #[error("download engine error: {0}")]
    Engine(#[from] EngineError),

    /// No pipeline was ever issued this id.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(PipelineId),
}

/// What a caller submits.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub payload: JobPayload,
    /// Destination relative to the engine's scratch root.
    pub destination: String,
    /// Title used to find the conversion job on the remote host.
    pub title: Option<String>,
}

impl PipelineRequest {
    pub fn new(payload: JobPayload, destination: impl Into<String>) -> Self {
        Self {
            payload,
            destination: destination.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Returned by a successful submission.
#[derive(Debug)]
pub struct PipelineHandle {
    pub id: PipelineId,
    /// Every event of this pipeline, in order. Yields `None` once the pipeline
    /// has been stopped, after which nothing more is emitted.
    pub updates: mpsc::UnboundedReceiver<PipelineEvent>,
}

/// Mutable per-pipeline view, updated by the pipeline's driver.
#[derive(Debug, Clone)]
pub(crate) struct PipelineStatus {
    pub stage: PipelineStage,
    pub title: Option<String>,
    pub target: Option<JobId>,
    pub target_name: Option<String>,
    pub acquisition_percent: u8,
    pub conversion_percent: u8,
    pub queue_status: Option<String>,
    pub subtitle_phase: Option<SubtitlePhase>,
    pub last_error: Option<String>,
}

impl PipelineStatus {
    pub fn new(title: Option<String>) -> Self {
        Self {
            stage: PipelineStage::Submitted,
            title,
            target: None,
            target_name: None,
            acquisition_percent: 0,
            conversion_percent: 0,
            queue_status: None,
            subtitle_phase: None,
            last_error: None,
        }
    }
}

/// Read-only snapshot of one pipeline for listings.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub id: PipelineId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub destination: String,
    pub stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub acquisition_percent: u8,
    pub conversion_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_phase: Option<SubtitlePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Resolve a relative destination against the scratch root.
///
/// Backslashes are treated as separators. Absolute paths and `..` segments are
/// rejected.
pub fn resolve_destination(scratch_root: &str, relative: &str) -> Result<String, OrchestratorError> {
    let normalized = relative.trim().replace('\\', "/");

    if normalized.starts_with('/') || normalized.chars().nth(1) == Some(':') {
        return Err(OrchestratorError::InvalidRequest(format!(
            "destination must be relative: {}",
            relative
        )));
    }

    let segments: Vec<&str> = normalized
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.iter().any(|s| *s == "..") {
        return Err(OrchestratorError::InvalidRequest(format!(
            "destination may not leave the scratch root: {}",
            relative
        )));
    }

    let root = scratch_root.trim_end_matches('/');
    if segments.is_empty() {
        Ok(root.to_string())
    } else {
        Ok(format!("{}/{}", root, segments.join("/")))
    }
}

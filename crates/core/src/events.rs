//! Update events emitted by pipeline loops.

use serde::{Deserialize, Serialize};

use crate::engine::{JobId, JobRecord};
use crate::telemetry::TelemetrySample;

/// Identifier assigned by the orchestrator, increasing in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub u64);

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle stage of a pipeline. Ordering follows declaration order and
/// transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Submitted,
    Acquiring,
    Tracking,
    AcquisitionComplete,
    ConversionTracking,
    ConversionComplete,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Submitted => "submitted",
            PipelineStage::Acquiring => "acquiring",
            PipelineStage::Tracking => "tracking",
            PipelineStage::AcquisitionComplete => "acquisition_complete",
            PipelineStage::ConversionTracking => "conversion_tracking",
            PipelineStage::ConversionComplete => "conversion_complete",
        }
    }

    /// Advance to `next` if it is later than `self`. Returns whether the stage changed.
    pub fn advance(&mut self, next: PipelineStage) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which loop an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStage {
    Acquisition,
    Conversion,
}

impl LoopStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStage::Acquisition => "acquisition",
            LoopStage::Conversion => "conversion",
        }
    }
}

/// A single update from one pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageChanged {
        stage: PipelineStage,
    },
    /// The submitted job was identified in the engine's job list.
    TargetAcquired {
        job_id: JobId,
        name: String,
    },
    AcquisitionUpdate {
        progress_percent: u8,
        /// Latest record for the target; `None` while waiting or if it vanished.
        job: Option<JobRecord>,
        /// Every identifier in the snapshot, in listing order.
        census: Vec<JobId>,
    },
    AcquisitionComplete {
        job_id: JobId,
    },
    ConversionUpdate {
        sample: TelemetrySample,
    },
    ConversionComplete,
    Error {
        stage: LoopStage,
        message: String,
        fatal: bool,
    },
}

impl PipelineEvent {
    pub fn error(stage: LoopStage, message: impl Into<String>, fatal: bool) -> Self {
        PipelineEvent::Error {
            stage,
            message: message.into(),
            fatal,
        }
    }

    /// Short name used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::StageChanged { .. } => "stage_changed",
            PipelineEvent::TargetAcquired { .. } => "target_acquired",
            PipelineEvent::AcquisitionUpdate { .. } => "acquisition_update",
            PipelineEvent::AcquisitionComplete { .. } => "acquisition_complete",
            PipelineEvent::ConversionUpdate { .. } => "conversion_update",
            PipelineEvent::ConversionComplete => "conversion_complete",
            PipelineEvent::Error { .. } => "error",
        }
    }
}

/// An event tagged with the pipeline it came from, as seen by dashboard subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineUpdate {
    pub pipeline_id: PipelineId,
    #[serde(flatten)]
    pub event: PipelineEvent,
}

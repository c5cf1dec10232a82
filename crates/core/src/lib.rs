pub mod acquisition;
pub mod config;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod orchestrator;
pub mod remote;
pub mod telemetry;
pub mod testing;
pub mod worker;

pub use acquisition::{AcquisitionPoller, AcquisitionTracker, TargetAcquisition};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    SessionPolicy,
};
pub use engine::{
    DownloadEngine, EngineError, EngineProvider, JobId, JobPayload, JobRecord, JobSnapshot,
    JobState, QBittorrentEngine, QBittorrentProvider,
};
pub use events::{LoopStage, PipelineEvent, PipelineId, PipelineStage, PipelineUpdate};
pub use orchestrator::{
    OrchestratorError, PipelineHandle, PipelineOrchestrator, PipelineRequest, PipelineSummary,
};
pub use remote::{
    sanitize_title, RemoteError, RemoteExecutor, RemoteProvider, SshExecutor, SshProvider,
    TelemetryQueries,
};
pub use telemetry::{SubtitlePhase, TelemetryPoller, TelemetrySample};

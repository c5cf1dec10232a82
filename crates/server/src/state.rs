use std::path::Path;
use std::sync::Arc;
use mediaflow_core::{Config, PipelineOrchestrator, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Directory `torrent_path` submissions may read from.
    pub fn torrent_dir(&self) -> Option<&Path> {
        self.config.server.torrent_dir.as_deref()
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        self.orchestrator.as_ref()
    }
}

//! Pipeline orchestrator implementation.
//!
//! Each submitted job gets its own pipeline: an acquisition loop that finds
//! and follows the job in the download engine, then a telemetry loop that
//! follows the remote conversion. Pipelines never share loops, engine
//! connections or remote sessions; the collection of pipelines is the only
//! shared state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};

use crate::acquisition::{AcquisitionPoller, AcquisitionTracker, TargetAcquisition};
use crate::config::{Config, PipelineConfig, RemoteConfig};
use crate::engine::EngineProvider;
use crate::events::{PipelineId, PipelineUpdate};
use crate::metrics;
use crate::remote::RemoteProvider;
use crate::worker::LoopHandle;

use super::pipeline::PipelineDriver;
use super::types::{
    resolve_destination, OrchestratorError, PipelineHandle, PipelineRequest, PipelineStatus,
    PipelineSummary,
};

/// A running pipeline as held by the orchestrator.
struct PipelineEntry {
    id: PipelineId,
    destination: String,
    submitted_at: DateTime<Utc>,
    status: Arc<RwLock<PipelineStatus>>,
    driver: LoopHandle,
}

impl PipelineEntry {
    async fn summary(&self) -> PipelineSummary {
        let status = self.status.read().await.clone();
        PipelineSummary {
            id: self.id,
            title: status.title,
            destination: self.destination.clone(),
            stage: status.stage,
            target: status.target,
            target_name: status.target_name,
            acquisition_percent: status.acquisition_percent,
            conversion_percent: status.conversion_percent,
            queue_status: status.queue_status,
            subtitle_phase: status.subtitle_phase,
            last_error: status.last_error,
            submitted_at: self.submitted_at,
        }
    }
}

/// The pipeline orchestrator - owns every pipeline and fans their updates out.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    remote_config: RemoteConfig,
    scratch_root: String,
    engines: Arc<dyn EngineProvider>,
    remotes: Arc<dyn RemoteProvider>,

    // Runtime state
    pipelines: RwLock<BTreeMap<PipelineId, Arc<PipelineEntry>>>,
    next_id: AtomicU64,
    updates_tx: broadcast::Sender<PipelineUpdate>,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: &Config,
        engines: Arc<dyn EngineProvider>,
        remotes: Arc<dyn RemoteProvider>,
    ) -> Self {
        let (updates_tx, _) = broadcast::channel(config.pipeline.update_buffer.max(1));

        Self {
            config: config.pipeline.clone(),
            remote_config: config.remote.clone(),
            scratch_root: config.engine.scratch_root.clone(),
            engines,
            remotes,
            pipelines: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            updates_tx,
        }
    }

    /// Submit a job and start tracking it.
    ///
    /// The engine's job list is captured before the job is enqueued; if that
    /// capture or the enqueue fails, nothing is started.
    pub async fn submit(&self, request: PipelineRequest) -> Result<PipelineHandle, OrchestratorError> {
        let result = self.start_pipeline(request).await;
        let label = if result.is_ok() { "accepted" } else { "rejected" };
        metrics::PIPELINES_SUBMITTED.with_label_values(&[label]).inc();
        result
    }

    async fn start_pipeline(
        &self,
        request: PipelineRequest,
    ) -> Result<PipelineHandle, OrchestratorError> {
        let destination = resolve_destination(&self.scratch_root, &request.destination)?;
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);

        // Separate connections: one for submission, one owned by the acquisition loop
        let submitter = self.engines.connect()?;
        let poller_engine = self.engines.connect()?;

        submitter.authenticate().await?;
        let pre_existing = submitter.list_jobs().await?;
        let target = TargetAcquisition::from_snapshot(&pre_existing);
        submitter
            .submit_job(&request.payload, &destination)
            .await?;

        let id = PipelineId(self.next_id.fetch_add(1, Ordering::SeqCst));
        info!(
            pipeline_id = %id,
            payload = %request.payload.describe(),
            destination = %destination,
            pre_existing = pre_existing.len(),
            "Submitted job, starting pipeline"
        );

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(PipelineStatus::new(title)));

        let acquisition = AcquisitionPoller::new(
            id,
            poller_engine,
            AcquisitionTracker::new(target),
            Duration::from_millis(self.config.acquisition_poll_interval_ms),
            loop_tx.clone(),
        );

        let driver = PipelineDriver {
            id,
            status: Arc::clone(&status),
            updates: updates_tx,
            broadcast: self.updates_tx.clone(),
            default_title: self.config.default_title.clone(),
            remotes: Arc::clone(&self.remotes),
            remote_config: self.remote_config.clone(),
            telemetry_interval: Duration::from_millis(self.config.telemetry_poll_interval_ms),
        }
        .spawn(acquisition, loop_tx, loop_rx);

        let entry = Arc::new(PipelineEntry {
            id,
            destination,
            submitted_at: Utc::now(),
            status,
            driver,
        });
        self.pipelines.write().await.insert(id, entry);
        metrics::PIPELINES_ACTIVE.inc();

        Ok(PipelineHandle {
            id,
            updates: updates_rx,
        })
    }

    /// Stop a pipeline and wait until both of its loops have exited.
    ///
    /// Returns `Ok(true)` if this call tore the pipeline down and `Ok(false)` if
    /// it was already gone. Concurrent calls for the same pipeline all return
    /// only after the teardown has finished.
    pub async fn stop(&self, id: PipelineId) -> Result<bool, OrchestratorError> {
        if id.0 == 0 || id.0 >= self.next_id.load(Ordering::SeqCst) {
            return Err(OrchestratorError::PipelineNotFound(id));
        }

        let entry = self.pipelines.read().await.get(&id).cloned();
        let Some(entry) = entry else {
            return Ok(false);
        };

        entry.driver.stop().await;

        let removed = self.pipelines.write().await.remove(&id).is_some();
        if removed {
            metrics::PIPELINES_ACTIVE.dec();
            info!(pipeline_id = %id, "Pipeline stopped");
        }
        Ok(removed)
    }

    /// Stop every pipeline. Used on process exit.
    pub async fn shutdown(&self) {
        let ids: Vec<PipelineId> = self.pipelines.read().await.keys().copied().collect();
        if ids.is_empty() {
            return;
        }

        info!(count = ids.len(), "Stopping all pipelines");
        for id in ids {
            if let Err(e) = self.stop(id).await {
                warn!(pipeline_id = %id, "Failed to stop pipeline: {}", e);
            }
        }
    }

    /// Receive updates from every pipeline.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineUpdate> {
        self.updates_tx.subscribe()
    }

    /// Summaries of all running pipelines, in submission order.
    pub async fn list(&self) -> Vec<PipelineSummary> {
        let entries: Vec<Arc<PipelineEntry>> =
            self.pipelines.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(entry.summary().await);
        }
        summaries
    }

    pub async fn get(&self, id: PipelineId) -> Option<PipelineSummary> {
        let entry = self.pipelines.read().await.get(&id).cloned()?;
        Some(entry.summary().await)
    }

    /// Number of running pipelines.
    pub async fn active_count(&self) -> usize {
        self.pipelines.read().await.len()
    }
}

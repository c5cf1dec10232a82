//! Per-pipeline driver task.
//!
//! Owns the acquisition and telemetry loops of one pipeline, consumes their
//! events, keeps the pipeline's status current, and forwards every event to
//! the consumers. Acquisition updates always precede conversion updates
//! because the acquisition loop is joined before the telemetry loop starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::acquisition::AcquisitionPoller;
use crate::config::RemoteConfig;
use crate::events::{LoopStage, PipelineEvent, PipelineId, PipelineStage, PipelineUpdate};
use crate::remote::{RemoteProvider, TelemetryQueries};
use crate::telemetry::TelemetryPoller;
use crate::worker::{LoopHandle, StopSignal};

use super::types::PipelineStatus;

pub(crate) struct PipelineDriver {
    pub id: PipelineId,
    pub status: Arc<RwLock<PipelineStatus>>,
    pub updates: mpsc::UnboundedSender<PipelineEvent>,
    pub broadcast: broadcast::Sender<PipelineUpdate>,
    pub default_title: String,
    pub remotes: Arc<dyn RemoteProvider>,
    pub remote_config: RemoteConfig,
    pub telemetry_interval: Duration,
}

impl PipelineDriver {
    /// Spawn the driver. `acquisition` must send its events on `loop_tx`.
    pub fn spawn(
        self,
        acquisition: AcquisitionPoller,
        loop_tx: mpsc::UnboundedSender<PipelineEvent>,
        loop_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    ) -> LoopHandle {
        let name = format!("pipeline-{}", self.id);
        LoopHandle::spawn(name, move |signal| {
            self.run(signal, acquisition, loop_tx, loop_rx)
        })
    }

    async fn run(
        self,
        mut signal: StopSignal,
        acquisition: AcquisitionPoller,
        loop_tx: mpsc::UnboundedSender<PipelineEvent>,
        mut loop_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    ) {
        let mut acquisition = Some(acquisition.spawn());
        let mut telemetry: Option<LoopHandle> = None;
        self.advance(PipelineStage::Acquiring).await;

        loop {
            tokio::select! {
                _ = signal.stopped() => break,
                Some(event) = loop_rx.recv() => {
                    let handoff = matches!(event, PipelineEvent::AcquisitionComplete { .. });
                    self.handle(event).await;

                    if handoff {
                        if let Some(handle) = acquisition.take() {
                            handle.stop().await;
                        }
                        telemetry = self.start_telemetry(loop_tx.clone()).await;
                    }
                }
            }
        }

        // Teardown: join both loops so nothing runs after stop returns
        for handle in acquisition.iter().chain(telemetry.iter()) {
            debug!(pipeline_id = %self.id, loop_name = handle.name(), "Stopping loop");
            handle.stop().await;
        }
        debug!(pipeline_id = %self.id, "Pipeline driver exited");
    }

    async fn handle(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::TargetAcquired { job_id, name } => {
                {
                    let mut status = self.status.write().await;
                    status.target = Some(job_id.clone());
                    if !name.trim().is_empty() {
                        status.target_name = Some(name.clone());
                    }
                }
                self.emit(event);
                self.advance(PipelineStage::Tracking).await;
                return;
            }
            PipelineEvent::AcquisitionUpdate {
                progress_percent,
                job,
                ..
            } => {
                let mut status = self.status.write().await;
                status.acquisition_percent = *progress_percent;
                if let Some(job) = job.as_ref().filter(|job| job.state.is_failure()) {
                    status.last_error = Some(format!(
                        "Download job {} reports state '{}'",
                        job.id, job.raw_state
                    ));
                }
            }
            PipelineEvent::AcquisitionComplete { .. } => {
                self.status.write().await.acquisition_percent = 100;
                self.emit(event);
                self.advance(PipelineStage::AcquisitionComplete).await;
                return;
            }
            PipelineEvent::ConversionUpdate { sample } => {
                let mut status = self.status.write().await;
                status.conversion_percent = sample.progress_percent;
                status.queue_status = Some(sample.queue_status.clone());
                status.subtitle_phase = Some(sample.subtitle_phase);
            }
            PipelineEvent::ConversionComplete => {
                self.emit(event);
                self.advance(PipelineStage::ConversionComplete).await;
                return;
            }
            PipelineEvent::Error {
                stage,
                message,
                fatal,
            } => {
                if *fatal {
                    warn!(
                        pipeline_id = %self.id,
                        stage = stage.as_str(),
                        "Pipeline loop stopped on fatal error: {}",
                        message
                    );
                }
                self.status.write().await.last_error = Some(message.clone());
            }
            PipelineEvent::StageChanged { .. } => {}
        }
        self.emit(event);
    }

    async fn start_telemetry(
        &self,
        loop_tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Option<LoopHandle> {
        let title = {
            let mut status = self.status.write().await;
            let title = status
                .title
                .clone()
                .or_else(|| status.target_name.clone())
                .unwrap_or_else(|| self.default_title.clone());
            status.title = Some(title.clone());
            title
        };

        let queries = TelemetryQueries::for_title(&title, &self.remote_config);
        info!(
            pipeline_id = %self.id,
            title = %title,
            remote_title = queries.title(),
            "Handing off to conversion telemetry"
        );

        let executor = match self.remotes.connect(&format!("p{}", self.id)) {
            Ok(executor) => executor,
            Err(e) => {
                self.handle(PipelineEvent::error(
                    LoopStage::Conversion,
                    format!("Failed to open remote session: {}", e),
                    true,
                ))
                .await;
                return None;
            }
        };

        let handle = TelemetryPoller::new(
            self.id,
            executor,
            queries,
            self.telemetry_interval,
            self.remote_config.log_tail_lines,
            loop_tx,
        )
        .spawn();
        self.advance(PipelineStage::ConversionTracking).await;
        Some(handle)
    }

    async fn advance(&self, next: PipelineStage) {
        let changed = self.status.write().await.stage.advance(next);
        if changed {
            debug!(pipeline_id = %self.id, stage = %next, "Pipeline stage changed");
            self.emit(PipelineEvent::StageChanged { stage: next });
        }
    }

    fn emit(&self, event: PipelineEvent) {
        // Broadcast has no receivers when no dashboard is connected
        let _ = self.broadcast.send(PipelineUpdate {
            pipeline_id: self.id,
            event: event.clone(),
        });
        let _ = self.updates.send(event);
    }
}

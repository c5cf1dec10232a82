//! Periodic loop that samples conversion telemetry from the remote host.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::events::{LoopStage, PipelineEvent, PipelineId};
use crate::metrics;
use crate::remote::{RemoteError, RemoteExecutor, TelemetryQueries};
use crate::worker::{LoopHandle, StopSignal};

use super::parser::assemble_sample;
use super::types::TelemetrySample;

enum TickOutcome {
    Continue,
    Finished,
}

/// Polls the conversion host until conversion completes or a stop is requested.
/// The executor is closed when the loop exits, whichever way it exits.
pub struct TelemetryPoller {
    pipeline_id: PipelineId,
    executor: Arc<dyn RemoteExecutor>,
    queries: TelemetryQueries,
    interval: Duration,
    tail_lines: usize,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl TelemetryPoller {
    pub fn new(
        pipeline_id: PipelineId,
        executor: Arc<dyn RemoteExecutor>,
        queries: TelemetryQueries,
        interval: Duration,
        tail_lines: usize,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            pipeline_id,
            executor,
            queries,
            interval,
            tail_lines,
            events,
        }
    }

    /// Start the loop on the runtime.
    pub fn spawn(self) -> LoopHandle {
        let name = format!("telemetry-{}", self.pipeline_id);
        LoopHandle::spawn(name, move |signal| self.run(signal))
    }

    pub async fn run(self, mut signal: StopSignal) {
        info!(
            pipeline_id = %self.pipeline_id,
            executor = self.executor.name(),
            title = self.queries.title(),
            "Telemetry poller started"
        );

        while signal.is_running() {
            if let TickOutcome::Finished = self.tick(&signal).await {
                break;
            }
            if !signal.sleep(self.interval).await {
                break;
            }
        }

        if let Err(e) = self.executor.close().await {
            warn!(pipeline_id = %self.pipeline_id, "Failed to close remote session: {}", e);
        }
        info!(pipeline_id = %self.pipeline_id, "Telemetry poller stopped");
    }

    async fn tick(&self, signal: &StopSignal) -> TickOutcome {
        let sample = match self.collect(signal).await {
            Ok(Some(sample)) => sample,
            // Stop requested between commands
            Ok(None) => return TickOutcome::Finished,
            Err(e) if e.is_unavailable() => {
                metrics::TELEMETRY_TICKS
                    .with_label_values(&["unavailable"])
                    .inc();
                debug!(pipeline_id = %self.pipeline_id, "Telemetry unavailable: {}", e);
                TelemetrySample::unavailable()
            }
            Err(e) if e.is_auth() => {
                metrics::TELEMETRY_TICKS.with_label_values(&["error"]).inc();
                error!(pipeline_id = %self.pipeline_id, "Remote authentication failed: {}", e);
                self.emit(PipelineEvent::error(
                    LoopStage::Conversion,
                    e.to_string(),
                    true,
                ));
                return TickOutcome::Finished;
            }
            Err(e) => {
                metrics::TELEMETRY_TICKS.with_label_values(&["error"]).inc();
                warn!(pipeline_id = %self.pipeline_id, "Telemetry tick failed: {}", e);
                self.emit(PipelineEvent::error(
                    LoopStage::Conversion,
                    format!("Telemetry tick failed: {}", e),
                    false,
                ));
                return TickOutcome::Continue;
            }
        };

        if !sample.is_complete() {
            self.emit(PipelineEvent::ConversionUpdate { sample });
            return TickOutcome::Continue;
        }

        metrics::CONVERSIONS_COMPLETED.inc();
        info!(
            pipeline_id = %self.pipeline_id,
            progress = sample.progress_percent,
            queue_status = %sample.queue_status,
            "Conversion complete"
        );
        self.emit(PipelineEvent::ConversionUpdate { sample });
        self.emit(PipelineEvent::ConversionComplete);
        TickOutcome::Finished
    }

    /// Run the command set. `Ok(None)` if a stop arrived part way through.
    async fn collect(&self, signal: &StopSignal) -> Result<Option<TelemetrySample>, RemoteError> {
        let mut outputs = Vec::with_capacity(3);
        for command in [
            &self.queries.queue_status,
            &self.queries.general_log,
            &self.queries.conversion_log,
        ] {
            if !signal.is_running() {
                return Ok(None);
            }
            outputs.push(self.executor.execute(command).await?);
        }

        metrics::TELEMETRY_TICKS.with_label_values(&["sample"]).inc();
        Ok(Some(assemble_sample(
            outputs[0].as_deref(),
            outputs[1].as_deref(),
            outputs[2].as_deref(),
            self.tail_lines,
        )))
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}

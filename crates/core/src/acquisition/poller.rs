//! Periodic loop driving an [`AcquisitionTracker`] from engine snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::DownloadEngine;
use crate::events::{LoopStage, PipelineEvent, PipelineId};
use crate::metrics;
use crate::worker::{LoopHandle, StopSignal};

use super::tracker::AcquisitionTracker;

/// Polls the download engine until stopped.
pub struct AcquisitionPoller {
    pipeline_id: PipelineId,
    engine: Arc<dyn DownloadEngine>,
    tracker: AcquisitionTracker,
    interval: Duration,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl AcquisitionPoller {
    pub fn new(
        pipeline_id: PipelineId,
        engine: Arc<dyn DownloadEngine>,
        tracker: AcquisitionTracker,
        interval: Duration,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            pipeline_id,
            engine,
            tracker,
            interval,
            events,
        }
    }

    /// Start the loop on the runtime.
    pub fn spawn(self) -> LoopHandle {
        let name = format!("acquisition-{}", self.pipeline_id);
        LoopHandle::spawn(name, move |signal| self.run(signal))
    }

    /// Loop body. Authenticates once, then ticks until a stop is requested.
    pub async fn run(mut self, mut signal: StopSignal) {
        info!(
            pipeline_id = %self.pipeline_id,
            engine = self.engine.name(),
            "Acquisition poller started"
        );

        if let Err(e) = self.engine.authenticate().await {
            error!(pipeline_id = %self.pipeline_id, "Engine authentication failed: {}", e);
            self.emit(PipelineEvent::error(
                LoopStage::Acquisition,
                format!("Engine authentication failed: {}", e),
                true,
            ));
            return;
        }

        while signal.is_running() {
            self.tick().await;
            if !signal.sleep(self.interval).await {
                break;
            }
        }

        info!(pipeline_id = %self.pipeline_id, "Acquisition poller stopped");
    }

    async fn tick(&mut self) {
        let snapshot = match self.engine.list_jobs().await {
            Ok(snapshot) => {
                metrics::SNAPSHOT_FETCHES.with_label_values(&["success"]).inc();
                snapshot
            }
            Err(e) => {
                metrics::SNAPSHOT_FETCHES.with_label_values(&["error"]).inc();
                warn!(pipeline_id = %self.pipeline_id, "Failed to fetch job snapshot: {}", e);
                self.emit(PipelineEvent::error(
                    LoopStage::Acquisition,
                    format!("Failed to fetch job snapshot: {}", e),
                    false,
                ));
                return;
            }
        };

        debug!(
            pipeline_id = %self.pipeline_id,
            jobs = snapshot.len(),
            "Fetched job snapshot"
        );

        for event in self.tracker.observe(&snapshot) {
            match &event {
                PipelineEvent::TargetAcquired { job_id, name } => {
                    metrics::TARGETS_ACQUIRED.inc();
                    info!(pipeline_id = %self.pipeline_id, %job_id, "Latched target job '{}'", name);
                }
                PipelineEvent::AcquisitionComplete { job_id } => {
                    metrics::ACQUISITIONS_COMPLETED.inc();
                    info!(pipeline_id = %self.pipeline_id, %job_id, "Acquisition complete");
                }
                _ => {}
            }
            self.emit(event);
        }
    }

    fn emit(&self, event: PipelineEvent) {
        // Receiver gone means the pipeline is being torn down
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::TargetAcquisition;
    use crate::engine::{EngineError, JobSnapshot, JobState};
    use crate::testing::{fixtures, MockDownloadEngine};
    use std::collections::HashSet;

    fn poller(
        engine: &MockDownloadEngine,
    ) -> (AcquisitionPoller, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = AcquisitionTracker::new(TargetAcquisition::new(HashSet::new()));
        let poller = AcquisitionPoller::new(
            PipelineId(1),
            Arc::new(engine.clone()),
            tracker,
            Duration::from_millis(10),
            tx,
        );
        (poller, rx)
    }

    #[tokio::test]
    async fn test_auth_failure_at_start_is_fatal_and_reported_once() {
        let engine = MockDownloadEngine::new();
        engine.set_auth_failure("bad password").await;
        let (poller, mut rx) = poller(&engine);

        let handle = poller.spawn();
        // The loop exits by itself; closing of the channel proves it
        let mut errors = Vec::new();
        while let Some(event) = rx.recv().await {
            errors.push(event);
        }
        handle.stop().await;

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            PipelineEvent::Error { stage: LoopStage::Acquisition, fatal: true, .. }
        ));
        assert_eq!(engine.list_calls().await, 0);
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_fatal() {
        let engine = MockDownloadEngine::new();
        engine
            .push_list_error(EngineError::ConnectionFailed("refused".into()))
            .await;
        engine
            .push_snapshot(JobSnapshot::new(vec![fixtures::job(
                "t",
                1.0,
                JobState::Seeding,
            )]))
            .await;
        let (poller, mut rx) = poller(&engine);
        let handle = poller.spawn();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, PipelineEvent::Error { fatal: false, .. }));

        let mut completed = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, PipelineEvent::AcquisitionComplete { .. }) {
                completed = true;
                break;
            }
        }
        handle.stop().await;
        assert!(completed);
    }

    #[tokio::test]
    async fn test_stop_closes_event_stream() {
        let engine = MockDownloadEngine::new();
        let (poller, mut rx) = poller(&engine);
        let handle = poller.spawn();

        assert!(rx.recv().await.is_some());
        handle.stop().await;

        // Drain whatever was queued before stop returned, then the channel is closed
        while rx.try_recv().is_ok() {}
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}

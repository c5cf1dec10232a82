//! One tick of the acquisition stage, without timers or I/O.

use crate::engine::{JobId, JobRecord, JobSnapshot};
use crate::events::PipelineEvent;

use super::target::{Observation, TargetAcquisition};

/// Where the tracker is in the acquisition stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    WaitingForTarget,
    Tracking,
    Completed,
}

/// Turns successive snapshots into acquisition events.
///
/// `AcquisitionComplete` is produced at most once per tracker.
#[derive(Debug, Clone)]
pub struct AcquisitionTracker {
    target: TargetAcquisition,
    phase: TrackerPhase,
    last_percent: u8,
}

impl AcquisitionTracker {
    pub fn new(target: TargetAcquisition) -> Self {
        Self {
            target,
            phase: TrackerPhase::WaitingForTarget,
            last_percent: 0,
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn target(&self) -> Option<&JobId> {
        self.target.target()
    }

    pub fn last_percent(&self) -> u8 {
        self.last_percent
    }

    /// Feed one snapshot and collect the events it produces, in emission order.
    pub fn observe(&mut self, snapshot: &JobSnapshot) -> Vec<PipelineEvent> {
        let census: Vec<JobId> = snapshot.identifiers().cloned().collect();
        let mut events = Vec::new();

        let job = match self.target.observe(snapshot) {
            Observation::Waiting => {
                events.push(PipelineEvent::AcquisitionUpdate {
                    progress_percent: 0,
                    job: None,
                    census,
                });
                return events;
            }
            Observation::Latched(job) => {
                self.phase = TrackerPhase::Tracking;
                events.push(PipelineEvent::TargetAcquired {
                    job_id: job.id.clone(),
                    name: job.name.clone(),
                });
                job
            }
            Observation::Tracking(Some(job)) => job,
            Observation::Tracking(None) => {
                events.push(PipelineEvent::AcquisitionUpdate {
                    progress_percent: self.last_percent,
                    job: None,
                    census,
                });
                return events;
            }
        };

        self.track(job, census, &mut events);
        events
    }

    fn track(&mut self, job: &JobRecord, census: Vec<JobId>, events: &mut Vec<PipelineEvent>) {
        self.last_percent = job.progress_percent();
        events.push(PipelineEvent::AcquisitionUpdate {
            progress_percent: self.last_percent,
            job: Some(job.clone()),
            census,
        });

        if self.phase != TrackerPhase::Completed && job.is_complete() {
            self.phase = TrackerPhase::Completed;
            events.push(PipelineEvent::AcquisitionComplete {
                job_id: job.id.clone(),
            });
        }
    }
}

//! Identifies which newly appeared job belongs to a submission.

use std::collections::HashSet;

use crate::engine::{JobId, JobRecord, JobSnapshot};

/// Outcome of feeding one snapshot to [`TargetAcquisition`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<'a> {
    /// No new identifier has appeared yet.
    Waiting,
    /// The target was latched on this snapshot.
    Latched(&'a JobRecord),
    /// The target was already latched. `None` if it is missing from this snapshot.
    Tracking(Option<&'a JobRecord>),
}

/// Latches the first identifier that was not present before submission.
///
/// Unrelated jobs added between the pre-submission snapshot and the first
/// observation can be latched instead of ours; nothing here detects that.
#[derive(Debug, Clone)]
pub struct TargetAcquisition {
    pre_existing: HashSet<JobId>,
    target: Option<JobId>,
}

impl TargetAcquisition {
    /// `pre_existing` must be captured before the job is submitted.
    pub fn new(pre_existing: HashSet<JobId>) -> Self {
        Self {
            pre_existing,
            target: None,
        }
    }

    pub fn from_snapshot(snapshot: &JobSnapshot) -> Self {
        Self::new(snapshot.identifier_set())
    }

    pub fn target(&self) -> Option<&JobId> {
        self.target.as_ref()
    }

    pub fn is_acquired(&self) -> bool {
        self.target.is_some()
    }

    pub fn pre_existing(&self) -> &HashSet<JobId> {
        &self.pre_existing
    }

    /// Feed one snapshot. Once a target is latched it never changes.
    pub fn observe<'a>(&mut self, snapshot: &'a JobSnapshot) -> Observation<'a> {
        if let Some(target) = &self.target {
            return Observation::Tracking(snapshot.get(target));
        }

        match snapshot
            .jobs()
            .iter()
            .find(|job| !self.pre_existing.contains(&job.id))
        {
            Some(job) => {
                self.target = Some(job.id.clone());
                Observation::Latched(job)
            }
            None => Observation::Waiting,
        }
    }
}

//! Mock download engine for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::engine::{
    DownloadEngine, EngineError, EngineProvider, JobId, JobPayload, JobRecord, JobSnapshot,
    JobState,
};

/// A recorded job submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    /// Payload description (see [`JobPayload::describe`]).
    pub payload: String,
    /// Absolute save path handed to the engine.
    pub destination: String,
    /// When the submission was made.
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the DownloadEngine trait.
///
/// Clones share state, so the same mock can serve as the [`EngineProvider`]
/// for every loop of an orchestrator while the test keeps a handle to it.
///
/// - A live job list that `list_jobs` returns by default
/// - Scripted snapshots/errors returned ahead of the live list
/// - Jobs that appear in the live list when a submission is made
/// - Sticky authentication failure, one-shot submission failure
/// - Optional latency on every call, with a count of calls still in flight
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockDownloadEngine::new();
/// engine.set_jobs(vec![fixtures::job("old", 1.0, JobState::Seeding)]).await;
/// engine.appear_on_submit(fixtures::job("new", 0.0, JobState::Downloading)).await;
///
/// let orchestrator = PipelineOrchestrator::new(&config, Arc::new(engine.clone()), remote);
/// orchestrator.submit(request).await?;
///
/// engine.update_job("new", 1.0, JobState::Seeding).await; // acquisition completes
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockDownloadEngine {
    jobs: Arc<RwLock<Vec<JobRecord>>>,
    scripted: Arc<RwLock<VecDeque<Result<JobSnapshot, EngineError>>>>,
    on_submit: Arc<RwLock<VecDeque<JobRecord>>>,
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    auth_failure: Arc<RwLock<Option<String>>>,
    submit_error: Arc<RwLock<Option<EngineError>>>,
    list_calls: Arc<AtomicUsize>,
    auth_calls: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
    latency: Arc<RwLock<Option<Duration>>>,
    pending: Arc<AtomicUsize>,
}

impl MockDownloadEngine {
    /// Create a new mock engine with an empty job list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live job list.
    pub async fn set_jobs(&self, jobs: Vec<JobRecord>) {
        *self.jobs.write().await = jobs;
    }

    /// Queue a snapshot. Once returned it also becomes the live job list.
    pub async fn push_snapshot(&self, snapshot: JobSnapshot) {
        self.scripted.write().await.push_back(Ok(snapshot));
    }

    /// Queue a `list_jobs` failure.
    pub async fn push_list_error(&self, error: EngineError) {
        self.scripted.write().await.push_back(Err(error));
    }

    /// Append `job` to the live list when the next submission arrives.
    pub async fn appear_on_submit(&self, job: JobRecord) {
        self.on_submit.write().await.push_back(job);
    }

    /// Update progress and state of a job in the live list.
    pub async fn update_job(&self, id: &str, progress: f64, state: JobState) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id.as_str() == id) {
            job.progress = progress;
            job.state = state;
            job.raw_state = state.as_str().to_string();
        }
    }

    /// Remove a job from the live list.
    pub async fn remove_job(&self, id: &str) {
        self.jobs.write().await.retain(|j| j.id.as_str() != id);
    }

    /// Make every `authenticate` call fail until cleared.
    pub async fn set_auth_failure(&self, message: impl Into<String>) {
        *self.auth_failure.write().await = Some(message.into());
    }

    pub async fn clear_auth_failure(&self) {
        *self.auth_failure.write().await = None;
    }

    /// Make the next `submit_job` call fail.
    pub async fn set_submit_error(&self, error: EngineError) {
        *self.submit_error.write().await = Some(error);
    }

    /// Get all recorded submissions.
    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    pub async fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub async fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    /// Number of engine connections handed out through [`EngineProvider`].
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn has_job(&self, id: &str) -> bool {
        let id = JobId::from(id);
        self.jobs.read().await.iter().any(|j| j.id == id)
    }

    /// Delay every engine call by `latency` before it answers.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    /// Number of engine calls that started but have not returned.
    pub fn pending_calls(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Run `call` as one in-flight engine call, after the configured latency.
    async fn in_flight<T, F>(&self, call: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let result = call.await;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl DownloadEngine for MockDownloadEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn authenticate(&self) -> Result<(), EngineError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight(async {
            match self.auth_failure.read().await.as_ref() {
                Some(message) => Err(EngineError::AuthenticationFailed(message.clone())),
                None => Ok(()),
            }
        })
        .await
    }

    async fn list_jobs(&self) -> Result<JobSnapshot, EngineError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight(async {
            let scripted = self.scripted.write().await.pop_front();
            match scripted {
                Some(Ok(snapshot)) => {
                    *self.jobs.write().await = snapshot.jobs().to_vec();
                    Ok(snapshot)
                }
                Some(Err(e)) => Err(e),
                None => Ok(JobSnapshot::new(self.jobs.read().await.clone())),
            }
        })
        .await
    }

    async fn submit_job(&self, payload: &JobPayload, destination: &str) -> Result<(), EngineError> {
        self.in_flight(async {
            if let Some(err) = self.submit_error.write().await.take() {
                return Err(err);
            }

            self.submissions.write().await.push(RecordedSubmission {
                payload: payload.describe(),
                destination: destination.to_string(),
                timestamp: Utc::now(),
            });

            if let Some(job) = self.on_submit.write().await.pop_front() {
                self.jobs.write().await.push(job);
            }
            Ok(())
        })
        .await
    }
}

impl EngineProvider for MockDownloadEngine {
    fn connect(&self) -> Result<Arc<dyn DownloadEngine>, EngineError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

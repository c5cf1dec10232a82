//! Mock remote executor for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::remote::{RemoteError, RemoteExecutor, RemoteProvider};

/// Mock implementation of the RemoteExecutor trait.
///
/// Answers are chosen by substring: the first rule whose pattern occurs in the
/// command wins, and commands with no matching rule print nothing. Queued
/// errors take precedence over rules, one per call.
///
/// As a [`RemoteProvider`] it hands out clones that share all scripted state
/// but remember the session they were opened for, so tests can check which
/// sessions were opened and closed.
#[derive(Debug, Clone, Default)]
pub struct MockRemoteExecutor {
    rules: Arc<RwLock<Vec<(String, Option<String>)>>>,
    errors: Arc<RwLock<VecDeque<RemoteError>>>,
    commands: Arc<RwLock<Vec<String>>>,
    latency: Arc<RwLock<Option<Duration>>>,
    pending: Arc<AtomicUsize>,
    // `connect` is synchronous, so these use a blocking mutex
    opened: Arc<Mutex<Vec<String>>>,
    connect_error: Arc<Mutex<Option<RemoteError>>>,
    closed: Arc<RwLock<Vec<String>>>,
    session: Option<String>,
}

impl MockRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` with `output`. Replaces an existing
    /// rule for the same pattern.
    pub async fn respond_to(&self, pattern: &str, output: Option<&str>) {
        let mut rules = self.rules.write().await;
        let output = output.map(String::from);
        match rules.iter_mut().find(|(p, _)| p == pattern) {
            Some(rule) => rule.1 = output,
            None => rules.push((pattern.to_string(), output)),
        }
    }

    /// Fail the next call with `error`.
    pub async fn push_error(&self, error: RemoteError) {
        self.errors.write().await.push_back(error);
    }

    /// Every command received so far, in order.
    pub async fn commands(&self) -> Vec<String> {
        self.commands.read().await.clone()
    }

    /// Delay every `execute` call by `latency` before it answers.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    /// Number of `execute` calls that started but have not returned.
    pub fn pending_calls(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Make the next `connect` call fail.
    pub fn set_connect_error(&self, error: RemoteError) {
        *self.connect_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    /// Sessions handed out through [`RemoteProvider::connect`], in order.
    pub fn opened_sessions(&self) -> Vec<String> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sessions whose executor was closed, in order.
    pub async fn closed_sessions(&self) -> Vec<String> {
        self.closed.read().await.clone()
    }
}

#[async_trait]
impl RemoteExecutor for MockRemoteExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, command: &str) -> Result<Option<String>, RemoteError> {
        self.commands.write().await.push(command.to_string());
        self.pending.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.answer(command).await;

        self.pending.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) -> Result<(), RemoteError> {
        let session = self.session.clone().unwrap_or_default();
        self.closed.write().await.push(session);
        Ok(())
    }
}

impl MockRemoteExecutor {
    async fn answer(&self, command: &str) -> Result<Option<String>, RemoteError> {
        if let Some(err) = self.errors.write().await.pop_front() {
            return Err(err);
        }

        Ok(self
            .rules
            .read()
            .await
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .and_then(|(_, output)| output.clone()))
    }
}

impl RemoteProvider for MockRemoteExecutor {
    fn connect(&self, session: &str) -> Result<Arc<dyn RemoteExecutor>, RemoteError> {
        let error = self
            .connect_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(err) = error {
            return Err(err);
        }

        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(session.to_string());
        Ok(Arc::new(Self {
            session: Some(session.to_string()),
            ..self.clone()
        }))
    }
}

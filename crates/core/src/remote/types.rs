//! Types for remote command execution.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while running a command on the conversion host.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection refused, host unreachable, session dropped.
    #[error("Remote host unavailable: {0}")]
    Unavailable(String),

    /// Connect + command exceeded the wall-clock bound.
    #[error("Remote command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The host rejected our credentials.
    #[error("Remote authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The local ssh (or sshpass) binary is missing.
    #[error("SSH client not found at path: {path}")]
    ClientNotFound { path: PathBuf },

    /// I/O error while running the client.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Errors that mean "no data yet" rather than a failure worth reporting.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Timeout { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::AuthenticationFailed(_))
    }
}

/// Runs read-only commands on the conversion host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Run `command` and return its trimmed stdout, or `None` if it printed nothing.
    /// No retries.
    async fn execute(&self, command: &str) -> Result<Option<String>, RemoteError>;

    /// Release whatever the executor keeps open between commands. Called once
    /// by the owning loop on exit.
    async fn close(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Creates remote executors. Every telemetry loop gets its own executor,
/// keyed by `session`, so no two pipelines share a remote-shell session.
pub trait RemoteProvider: Send + Sync {
    fn connect(&self, session: &str) -> Result<Arc<dyn RemoteExecutor>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        assert!(RemoteError::Unavailable("refused".into()).is_unavailable());
        assert!(RemoteError::Timeout { timeout_secs: 10 }.is_unavailable());
        assert!(!RemoteError::AuthenticationFailed("denied".into()).is_unavailable());
        assert!(!RemoteError::ClientNotFound {
            path: PathBuf::from("ssh")
        }
        .is_unavailable());
        assert!(RemoteError::AuthenticationFailed("denied".into()).is_auth());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RemoteError::Timeout { timeout_secs: 7 }.to_string(),
            "Remote command timed out after 7 seconds"
        );
    }
}

//! OpenSSH-based remote executor.

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::config::{RemoteConfig, SessionPolicy};
use crate::metrics;

use super::commands::sanitize_title;
use super::types::{RemoteError, RemoteExecutor, RemoteProvider};

/// Exit status ssh uses for its own (transport) errors.
const SSH_TRANSPORT_FAILURE: i32 = 255;
/// sshpass: invalid password.
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// sshpass: host public key is unknown.
const SSHPASS_UNKNOWN_HOST_KEY: i32 = 6;

/// Runs commands through the system `ssh` client, one child process per command.
///
/// With [`SessionPolicy::Multiplexed`] the child processes share one master
/// connection through an OpenSSH control socket. The socket is keyed by the
/// executor's session name, so executors for different sessions never share
/// a master; [`RemoteExecutor::close`] tells the master to exit.
pub struct SshExecutor {
    config: RemoteConfig,
    session: String,
}

impl SshExecutor {
    /// Executor whose multiplexed master is private to `session`.
    pub fn for_session(config: RemoteConfig, session: &str) -> Self {
        Self {
            config,
            session: sanitize_title(session),
        }
    }

    fn multiplexed(&self) -> bool {
        self.config.session_policy == SessionPolicy::Multiplexed
    }

    fn uses_password(&self) -> bool {
        self.config.password.is_some()
    }

    /// Client binary that is actually spawned.
    fn program(&self) -> &PathBuf {
        if self.uses_password() {
            &self.config.sshpass_path
        } else {
            &self.config.ssh_path
        }
    }

    fn control_path(&self) -> PathBuf {
        let dir = self
            .config
            .control_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        // %C expands to a hash of local host, remote host, port and user
        dir.join(format!("mediaflow-{}-%C", self.session))
    }

    fn control_path_arg(&self) -> String {
        format!("ControlPath={}", self.control_path().display())
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }

    /// Arguments that ask a multiplexed master to exit. `None` when the
    /// executor keeps no master connection.
    pub fn exit_args(&self) -> Option<Vec<String>> {
        if !self.multiplexed() {
            return None;
        }
        Some(vec![
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            self.control_path_arg(),
            "-O".to_string(),
            "exit".to_string(),
            "--".to_string(),
            self.destination(),
        ])
    }

    /// Arguments passed to `ssh` for `remote_command`.
    pub fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let config = &self.config;
        let mut args = vec![
            "-p".to_string(),
            config.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", config.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];

        if self.uses_password() {
            args.extend([
                "-o".to_string(),
                "PreferredAuthentications=password,keyboard-interactive".to_string(),
                "-o".to_string(),
                "NumberOfPasswordPrompts=1".to_string(),
            ]);
        } else {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }

        if let Some(identity) = &config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        if self.multiplexed() {
            args.extend([
                "-o".to_string(),
                "ControlMaster=auto".to_string(),
                "-o".to_string(),
                self.control_path_arg(),
                "-o".to_string(),
                format!("ControlPersist={}s", config.control_persist_secs),
            ]);
        }

        args.push("--".to_string());
        args.push(self.destination());
        args.push(remote_command.to_string());
        args
    }

    fn build_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(self.program());
        if let Some(password) = &self.config.password {
            // Password travels through the environment, never argv
            cmd.arg("-e").arg(&self.config.ssh_path).env("SSHPASS", password);
        }
        cmd.args(self.ssh_args(remote_command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, remote_command: &str) -> Result<Option<String>, RemoteError> {
        let child = self.build_command(remote_command).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RemoteError::ClientNotFound {
                    path: self.program().clone(),
                }
            } else {
                RemoteError::Io(e)
            }
        })?;

        let timeout_secs = self.config.command_timeout_secs;
        // Dropping the future on timeout drops the child, which kills it
        let output = match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await
        {
            Ok(result) => result?,
            Err(_) => return Err(RemoteError::Timeout { timeout_secs }),
        };

        interpret_output(&output, self.uses_password())
    }

    /// Stop the multiplexed master, if any. The exit status is not checked
    /// beyond logging: the master may never have started.
    async fn exit_master(&self) -> Result<(), RemoteError> {
        let Some(args) = self.exit_args() else {
            return Ok(());
        };

        // Control commands talk to the local socket only, no credentials needed
        let child = Command::new(&self.config.ssh_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RemoteError::ClientNotFound {
                        path: self.config.ssh_path.clone(),
                    }
                } else {
                    RemoteError::Io(e)
                }
            })?;

        let timeout_secs = self.config.connect_timeout_secs;
        match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                if !output.status.success() {
                    debug!(
                        control_path = %self.control_path().display(),
                        "No master connection to close: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
                Ok(())
            }
            Err(_) => Err(RemoteError::Timeout { timeout_secs }),
        }
    }
}

/// Map a finished client process to a result.
fn interpret_output(output: &Output, via_sshpass: bool) -> Result<Option<String>, RemoteError> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();

    let code = match output.status.code() {
        Some(code) => code,
        None => {
            return Err(RemoteError::Unavailable(
                "ssh client terminated by signal".to_string(),
            ))
        }
    };

    if via_sshpass && code == SSHPASS_BAD_PASSWORD {
        return Err(RemoteError::AuthenticationFailed(
            "password rejected".to_string(),
        ));
    }

    if code == SSH_TRANSPORT_FAILURE || (via_sshpass && code == SSHPASS_UNKNOWN_HOST_KEY) {
        let message = stderr
            .lines()
            .last()
            .unwrap_or("ssh transport failure")
            .to_string();
        if stderr.contains("Permission denied") {
            return Err(RemoteError::AuthenticationFailed(message));
        }
        return Err(RemoteError::Unavailable(message));
    }

    if code != 0 && !stderr.is_empty() {
        debug!(exit_code = code, "Remote command wrote to stderr: {}", stderr);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if stdout.is_empty() {
        Ok(None)
    } else {
        Ok(Some(stdout.to_string()))
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn name(&self) -> &str {
        "ssh"
    }

    async fn execute(&self, command: &str) -> Result<Option<String>, RemoteError> {
        let started = Instant::now();
        let result = self.run(command).await;

        let label = match &result {
            Ok(_) => "success",
            Err(e) if e.is_unavailable() => "unavailable",
            Err(_) => "error",
        };
        metrics::REMOTE_COMMAND_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.exit_master().await
    }
}

/// Hands each telemetry loop an [`SshExecutor`] with its own session.
pub struct SshProvider {
    config: RemoteConfig,
}

impl SshProvider {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

impl RemoteProvider for SshProvider {
    fn connect(&self, session: &str) -> Result<Arc<dyn RemoteExecutor>, RemoteError> {
        debug!(session, policy = ?self.config.session_policy, "Creating ssh executor");
        Ok(Arc::new(SshExecutor::for_session(
            self.config.clone(),
            session,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        Output {
            // Raw wait status: exit code lives in the second byte
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn config() -> RemoteConfig {
        RemoteConfig {
            host: "encoder.lan".to_string(),
            user: "media".to_string(),
            port: 2222,
            ..RemoteConfig::default()
        }
    }

    #[test]
    fn test_args_key_auth() {
        let mut config = config();
        config.identity_file = Some(PathBuf::from("/keys/id_ed25519"));
        let executor = SshExecutor::for_session(config, "p1");
        let args = executor.ssh_args("uptime");

        assert_eq!(&args[..2], &["-p", "2222"]);
        assert!(args.contains(&"ConnectTimeout=5".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"/keys/id_ed25519".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("ControlMaster")));
        assert_eq!(&args[args.len() - 3..], &["--", "media@encoder.lan", "uptime"]);
        assert_eq!(executor.program(), &PathBuf::from("ssh"));
    }

    #[test]
    fn test_args_password_auth_never_leaks_password() {
        let mut config = config();
        config.password = Some("hunter2".to_string());
        let executor = SshExecutor::for_session(config, "p1");
        let args = executor.ssh_args("uptime");

        assert!(!args.iter().any(|a| a.contains("hunter2")));
        assert!(!args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"NumberOfPasswordPrompts=1".to_string()));
        assert_eq!(executor.program(), &PathBuf::from("sshpass"));

        let cmd = executor.build_command("uptime");
        let argv: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&argv[..2], &["-e", "ssh"]);
        assert!(!argv.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn test_args_multiplexed() {
        let mut config = config();
        config.session_policy = SessionPolicy::Multiplexed;
        config.control_dir = Some(PathBuf::from("/run/mediaflow"));
        config.control_persist_secs = 120;
        let args = SshExecutor::for_session(config, "p1").ssh_args("true");

        assert!(args.contains(&"ControlMaster=auto".to_string()));
        assert!(args.contains(&"ControlPath=/run/mediaflow/mediaflow-p1-%C".to_string()));
        assert!(args.contains(&"ControlPersist=120s".to_string()));
    }

    #[test]
    fn test_sessions_get_their_own_control_socket() {
        let mut config = config();
        config.session_policy = SessionPolicy::Multiplexed;
        config.control_dir = Some(PathBuf::from("/run/mediaflow"));

        let first = SshExecutor::for_session(config.clone(), "p1").ssh_args("true");
        let second = SshExecutor::for_session(config, "p2").ssh_args("true");

        assert!(first.contains(&"ControlPath=/run/mediaflow/mediaflow-p1-%C".to_string()));
        assert!(second.contains(&"ControlPath=/run/mediaflow/mediaflow-p2-%C".to_string()));
    }

    #[test]
    fn test_exit_args_multiplexed() {
        let mut config = config();
        config.session_policy = SessionPolicy::Multiplexed;
        config.control_dir = Some(PathBuf::from("/run/mediaflow"));
        let executor = SshExecutor::for_session(config, "p7");

        let connect = executor.ssh_args("true");
        let exit = executor.exit_args().unwrap();
        assert_eq!(
            exit,
            vec![
                "-p",
                "2222",
                "-o",
                "ControlPath=/run/mediaflow/mediaflow-p7-%C",
                "-O",
                "exit",
                "--",
                "media@encoder.lan",
            ]
        );
        // Same socket the commands were multiplexed over
        let control_path = &exit[3];
        assert!(connect.contains(control_path));
    }

    #[test]
    fn test_exit_args_absent_per_command() {
        let executor = SshExecutor::for_session(config(), "p7");
        assert!(executor.exit_args().is_none());
    }

    #[tokio::test]
    async fn test_close_is_a_no_op_per_command() {
        let mut config = config();
        config.ssh_path = PathBuf::from("/nonexistent/ssh");
        let executor = SshExecutor::for_session(config, "p1");
        // No master to stop, so the missing binary is never spawned
        assert!(executor.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_reports_missing_client() {
        let mut config = config();
        config.session_policy = SessionPolicy::Multiplexed;
        config.ssh_path = PathBuf::from("/nonexistent/ssh");
        let executor = SshExecutor::for_session(config, "p1");

        let err = executor.close().await.unwrap_err();
        assert!(matches!(err, RemoteError::ClientNotFound { .. }));
    }

    #[test]
    fn test_provider_hands_out_distinct_sessions() {
        let provider = SshProvider::new(config());
        let a = provider.connect("p1").unwrap();
        let b = provider.connect("p2").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "ssh");
    }

    #[test]
    fn test_interpret_success_trims_output() {
        let result = interpret_output(&output(0, "  CONVERTING \n", ""), false).unwrap();
        assert_eq!(result.as_deref(), Some("CONVERTING"));
    }

    #[test]
    fn test_interpret_empty_output_is_none() {
        assert_eq!(interpret_output(&output(0, " \n", ""), false).unwrap(), None);
        // Remote command failures still return whatever stdout there was
        assert_eq!(
            interpret_output(&output(1, "", "sqlite3: not found"), false).unwrap(),
            None
        );
    }

    #[test]
    fn test_interpret_transport_failure() {
        let err = interpret_output(
            &output(255, "", "ssh: connect to host encoder.lan port 22: Connection refused"),
            false,
        )
        .unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("Connection refused"));
    }

    #[test]
    fn test_interpret_permission_denied() {
        let err = interpret_output(
            &output(255, "", "media@encoder.lan: Permission denied (publickey)."),
            false,
        )
        .unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_interpret_sshpass_codes() {
        assert!(interpret_output(&output(5, "", ""), true).unwrap_err().is_auth());
        assert!(interpret_output(&output(6, "", ""), true)
            .unwrap_err()
            .is_unavailable());
        // Without sshpass, 5 is just the remote command's exit status
        assert_eq!(interpret_output(&output(5, "x", ""), false).unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_missing_client_binary() {
        let mut config = config();
        config.ssh_path = PathBuf::from("/nonexistent/bin/ssh");
        let executor = SshExecutor::for_session(config, "p1");

        let err = executor.execute("true").await.unwrap_err();
        assert!(matches!(err, RemoteError::ClientNotFound { .. }));
    }
}
